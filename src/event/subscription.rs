use std::any::Any;
use std::cmp::Reverse;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::events::{Event, Topic};
use super::handler::{Delivery, Listener, ListenerError};

/// Registration-order identifier of a subscription
///
/// Ids are allocated from one counter per bus, so they also order
/// subscriptions across different topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Returned by subscribe; pass it back to unsubscribe
///
/// A handle only ever matches a subscription of the registry that issued
/// it. Handing it to another bus is a no-op there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    registry: u64,
    id: SubscriptionId,
    topic: Topic,
}

impl SubscriptionHandle {
    pub(crate) fn new(registry: u64, id: SubscriptionId, topic: Topic) -> Self {
        Self {
            registry,
            id,
            topic,
        }
    }

    /// Identity of the registry that issued this handle
    pub(crate) fn registry(&self) -> u64 {
        self.registry
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event type the subscription listens to
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.topic.short_name())
    }
}

/// Predicate deciding whether a subscription wants a given event
pub type EventFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Per-subscription settings
///
/// Under [`DuplicatePolicy::Ignore`](crate::DuplicatePolicy::Ignore), subscribing
/// a listener that is already subscribed to the same event at the same
/// priority returns the existing handle. The name and filter given here are
/// then discarded; unsubscribe first to change them.
///
/// ```
/// use kawa::{Event, SubscribeOptions};
///
/// struct Scored { points: u32 }
/// impl Event for Scored {}
///
/// let options = SubscribeOptions::<Scored>::new()
///     .priority(10)
///     .named("high-scores")
///     .filter(|e: &Scored| e.points > 100);
/// assert_eq!(options.priority_value(), Some(10));
/// ```
pub struct SubscribeOptions<E> {
    priority: Option<i32>,
    name: Option<String>,
    filter: Option<EventFilter<E>>,
}

impl<E: Event> SubscribeOptions<E> {
    pub fn new() -> Self {
        Self {
            priority: None,
            name: None,
            filter: None,
        }
    }

    /// Higher priorities run first; unset means the bus default
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Name used in logs instead of the listener's own name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only deliver events for which `filter` returns true
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn priority_value(&self) -> Option<i32> {
        self.priority
    }

    pub(crate) fn into_parts(self) -> (Option<i32>, Option<String>, Option<EventFilter<E>>) {
        (self.priority, self.name, self.filter)
    }
}

impl<E: Event> Default for SubscribeOptions<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SubscribeOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

/// Resolved view of one subscription, as returned by lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub handle: SubscriptionHandle,
    pub name: String,
    pub priority: i32,
}

/// Listener with its event type erased, so topics of any type share storage
pub(crate) trait ErasedListener: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self, event: &dyn Any) -> bool;

    fn invoke(&self, event: &dyn Any, delivery: &mut Delivery) -> Result<(), ListenerError>;
}

pub(crate) struct TypedListener<E, L: ?Sized> {
    listener: Arc<L>,
    filter: Option<EventFilter<E>>,
}

impl<E, L> TypedListener<E, L>
where
    E: Event,
    L: Listener<E> + ?Sized + 'static,
{
    pub(crate) fn new(listener: Arc<L>, filter: Option<EventFilter<E>>) -> Self {
        Self { listener, filter }
    }

    /// Address of the listener instance, used to spot duplicate registrations
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.listener) as *const () as usize
    }
}

impl<E, L> ErasedListener for TypedListener<E, L>
where
    E: Event,
    L: Listener<E> + ?Sized + 'static,
{
    fn name(&self) -> &str {
        self.listener.name()
    }

    fn accepts(&self, event: &dyn Any) -> bool {
        match (event.downcast_ref::<E>(), &self.filter) {
            (Some(event), Some(filter)) => filter(event),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn invoke(&self, event: &dyn Any, delivery: &mut Delivery) -> Result<(), ListenerError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.listener.handle(event, delivery),
            None => Err(ListenerError::failed(format!(
                "expected {} but was routed another event type",
                std::any::type_name::<E>()
            ))),
        }
    }
}

/// A stored registration
pub(crate) struct Subscription {
    handle: SubscriptionHandle,
    priority: i32,
    name: String,
    identity: usize,
    listener: Box<dyn ErasedListener>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        priority: i32,
        name: String,
        identity: usize,
        listener: Box<dyn ErasedListener>,
    ) -> Self {
        Self {
            handle,
            priority,
            name,
            identity,
            listener,
            active: AtomicBool::new(true),
        }
    }

    pub(crate) fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn listener(&self) -> &dyn ErasedListener {
        self.listener.as_ref()
    }

    /// Dispatch order: higher priority first, then registration order
    pub(crate) fn order_key(&self) -> (Reverse<i32>, SubscriptionId) {
        (Reverse(self.priority), self.handle.id())
    }

    /// Same listener instance registered on the same topic with the same priority
    pub(crate) fn is_duplicate_of(&self, other: &Subscription) -> bool {
        self.identity == other.identity
            && self.priority == other.priority
            && self.handle.topic() == other.handle.topic()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn info(&self) -> ListenerInfo {
        ListenerInfo {
            handle: self.handle,
            name: self.name.clone(),
            priority: self.priority,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::handler::{ListenerFn, NoOpListener};

    struct Scored {
        points: u32,
    }
    impl Event for Scored {}

    struct Other;
    impl Event for Other {}

    fn delivery() -> Delivery {
        let handle = SubscriptionHandle::new(0, SubscriptionId::new(0), Topic::of::<Scored>());
        Delivery::new(Topic::of::<Scored>(), handle, false)
    }

    #[test]
    fn test_typed_listener_applies_filter() {
        let filter: EventFilter<Scored> = Arc::new(|e: &Scored| e.points > 10);
        let typed = TypedListener::<Scored, _>::new(Arc::new(NoOpListener), Some(filter));

        assert!(typed.accepts(&Scored { points: 11 }));
        assert!(!typed.accepts(&Scored { points: 10 }));
        assert!(!typed.accepts(&Other));
    }

    #[test]
    fn test_typed_listener_rejects_wrong_event_type() {
        let typed = TypedListener::<Scored, _>::new(
            ListenerFn::arc("scores", |_: &Scored, _: &mut Delivery| Ok(())),
            None,
        );

        assert!(typed.invoke(&Scored { points: 1 }, &mut delivery()).is_ok());
        assert!(typed.invoke(&Other, &mut delivery()).is_err());
    }

    #[test]
    fn test_identity_follows_the_arc_not_the_type() {
        let shared = Arc::new(NoOpListener);
        let a = TypedListener::<Scored, _>::new(Arc::clone(&shared), None);
        let b = TypedListener::<Scored, _>::new(Arc::clone(&shared), None);
        let c = TypedListener::<Scored, _>::new(Arc::new(NoOpListener), None);

        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_order_key_prefers_priority_then_registration() {
        let make = |id: u64, priority: i32| {
            Subscription::new(
                SubscriptionHandle::new(0, SubscriptionId::new(id), Topic::of::<Scored>()),
                priority,
                "x".to_string(),
                id as usize,
                Box::new(TypedListener::<Scored, _>::new(Arc::new(NoOpListener), None)),
            )
        };

        let low_early = make(1, 0);
        let high_late = make(2, 5);
        let low_late = make(3, 0);

        assert!(high_late.order_key() < low_early.order_key());
        assert!(low_early.order_key() < low_late.order_key());
    }

    #[test]
    fn test_handle_display_is_compact() {
        let handle = SubscriptionHandle::new(0, SubscriptionId::new(42), Topic::of::<Scored>());
        assert_eq!(handle.to_string(), "#42@Scored");
    }
}
