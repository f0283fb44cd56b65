use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::events::{Ancestor, Event, Projection, Topic};
use super::handler::Listener;
use super::subscription::{
    ErasedListener, ListenerInfo, SubscribeOptions, Subscription, SubscriptionHandle,
    SubscriptionId, TypedListener,
};
use crate::config::DuplicatePolicy;
use crate::shared::BusError;

/// Subscriptions of one topic, kept sorted in dispatch order
///
/// The shape follows the population: a lone subscription is stored as is,
/// two or more share one immutable sorted slice. Every mutation builds a
/// new value, so a clone taken by a publisher never changes under it.
#[derive(Clone, Default)]
pub(crate) enum TopicSubscriptions {
    #[default]
    Empty,
    Single(Arc<Subscription>),
    Many(Arc<[Arc<Subscription>]>),
}

impl TopicSubscriptions {
    pub(crate) fn len(&self) -> usize {
        match self {
            TopicSubscriptions::Empty => 0,
            TopicSubscriptions::Single(_) => 1,
            TopicSubscriptions::Many(subs) => subs.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, TopicSubscriptions::Empty)
    }

    pub(crate) fn as_slice(&self) -> &[Arc<Subscription>] {
        match self {
            TopicSubscriptions::Empty => &[],
            TopicSubscriptions::Single(sub) => std::slice::from_ref(sub),
            TopicSubscriptions::Many(subs) => &subs[..],
        }
    }

    fn find_duplicate(&self, candidate: &Subscription) -> Option<&Arc<Subscription>> {
        self.as_slice()
            .iter()
            .find(|existing| existing.is_duplicate_of(candidate))
    }

    /// Copy with `sub` inserted at its ordered position
    fn with(&self, sub: Arc<Subscription>) -> Self {
        match self {
            TopicSubscriptions::Empty => TopicSubscriptions::Single(sub),
            _ => {
                let mut subs = self.as_slice().to_vec();
                let key = sub.order_key();
                let at = subs.partition_point(|existing| existing.order_key() <= key);
                subs.insert(at, sub);
                TopicSubscriptions::Many(subs.into())
            }
        }
    }

    /// Copy without the subscription `id`, plus the removed entry
    fn without(&self, id: SubscriptionId) -> (Self, Option<Arc<Subscription>>) {
        let subs = self.as_slice();
        let Some(at) = subs.iter().position(|sub| sub.handle().id() == id) else {
            return (self.clone(), None);
        };
        let removed = Arc::clone(&subs[at]);

        let mut rest = subs.to_vec();
        rest.remove(at);
        let next = match rest.len() {
            0 => TopicSubscriptions::Empty,
            1 => TopicSubscriptions::Single(rest.remove(0)),
            _ => TopicSubscriptions::Many(rest.into()),
        };
        (next, Some(removed))
    }
}

/// One step of a dispatch plan
///
/// `project` is set when the subscription listens to a supertype of the
/// published event.
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) subscription: Arc<Subscription>,
    pub(crate) project: Option<Projection>,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("subscription", &self.subscription)
            .field("projected", &self.project.is_some())
            .finish()
    }
}

/// Outcome of a register call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Registration {
    pub(crate) handle: SubscriptionHandle,
    /// False when an identical subscription already existed and was reused
    pub(crate) created: bool,
}

// Registry identities start at 1; 0 never matches a live registry.
static NEXT_REGISTRY: AtomicU64 = AtomicU64::new(1);

/// Concurrent store of subscriptions keyed by event type
///
/// Readers clone the per-topic list and drop the shard lock before any
/// listener runs; writers replace the list under the shard lock. Unrelated
/// topics do not contend unless they hash to the same shard.
///
/// Once [`close`](Self::close)d the registry refuses new subscriptions. The
/// closed flag is checked under the same shard lock as the insert, so a
/// registration racing `close` either fails or is removed by it.
pub struct SubscriptionRegistry {
    id: u64,
    topics: DashMap<TypeId, TopicSubscriptions>,
    lineages: DashMap<TypeId, Arc<[Ancestor]>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    duplicate_policy: DuplicatePolicy,
    default_priority: i32,
}

impl SubscriptionRegistry {
    pub fn new(duplicate_policy: DuplicatePolicy, default_priority: i32) -> Self {
        Self {
            id: NEXT_REGISTRY.fetch_add(1, Ordering::Relaxed),
            topics: DashMap::new(),
            lineages: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            duplicate_policy,
            default_priority,
        }
    }

    /// Store a listener for events of type `E`
    pub fn register<E, L>(
        &self,
        listener: Arc<L>,
        options: SubscribeOptions<E>,
    ) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        L: Listener<E> + ?Sized + 'static,
    {
        self.register_entry(listener, options)
            .map(|registration| registration.handle)
    }

    pub(crate) fn register_entry<E, L>(
        &self,
        listener: Arc<L>,
        options: SubscribeOptions<E>,
    ) -> Result<Registration, BusError>
    where
        E: Event,
        L: Listener<E> + ?Sized + 'static,
    {
        let topic = Topic::of::<E>();
        // Resolve supertypes now so the first publish does not pay for it.
        self.lineage_of::<E>();

        let (priority, name, filter) = options.into_parts();
        let customised = name.is_some() || filter.is_some();
        let priority = priority.unwrap_or(self.default_priority);
        let typed = TypedListener::new(listener, filter);
        let identity = typed.identity();
        let name = name.unwrap_or_else(|| typed.name().to_string());

        let mut entry = self.topics.entry(topic.id()).or_default();
        if self.is_closed() {
            drop(entry);
            self.topics.remove_if(&topic.id(), |_, subs| subs.is_empty());
            return Err(BusError::Closed);
        }

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = SubscriptionHandle::new(self.id, id, topic);
        let candidate = Subscription::new(handle, priority, name, identity, Box::new(typed));

        if let Some(existing) = entry.find_duplicate(&candidate) {
            match self.duplicate_policy {
                DuplicatePolicy::Ignore => {
                    warn!(
                        event = %topic,
                        listener = existing.name(),
                        subscription = %existing.handle(),
                        options_discarded = customised,
                        "Listener already subscribed, reusing existing subscription"
                    );
                    return Ok(Registration {
                        handle: existing.handle(),
                        created: false,
                    });
                }
                DuplicatePolicy::Reject => {
                    return Err(BusError::DuplicateRegistration {
                        listener: existing.name().to_string(),
                        topic,
                        existing: existing.handle().id(),
                    });
                }
                DuplicatePolicy::Allow => {}
            }
        }

        debug!(
            event = %topic,
            listener = candidate.name(),
            priority = priority,
            subscription = %handle,
            "Registering listener"
        );
        let next = entry.with(Arc::new(candidate));
        *entry = next;

        Ok(Registration {
            handle,
            created: true,
        })
    }

    /// Remove a subscription; returns whether it was present
    ///
    /// Unknown or already removed handles are ignored.
    pub fn unregister(&self, handle: &SubscriptionHandle) -> bool {
        if handle.registry() != self.id {
            debug!(subscription = %handle, "Handle issued by another registry ignored");
            return false;
        }
        let key = handle.topic().id();
        let removed = {
            let Some(mut entry) = self.topics.get_mut(&key) else {
                return false;
            };
            let (next, removed) = entry.without(handle.id());
            if removed.is_some() {
                *entry = next;
            }
            removed
        };
        self.topics.remove_if(&key, |_, subs| subs.is_empty());

        match removed {
            Some(sub) => {
                sub.deactivate();
                debug!(
                    event = %handle.topic(),
                    listener = sub.name(),
                    subscription = %handle,
                    "Unregistered listener"
                );
                true
            }
            None => false,
        }
    }

    /// Like [`unregister`](Self::unregister) but reports unknown handles
    pub fn try_unregister(&self, handle: &SubscriptionHandle) -> Result<(), BusError> {
        if self.unregister(handle) {
            Ok(())
        } else {
            Err(BusError::UnknownSubscription(handle.id()))
        }
    }

    /// Listeners that receive events of type `E`, in dispatch order
    ///
    /// Includes subscriptions to every supertype in `E`'s lineage.
    pub fn lookup<E: Event>(&self) -> Vec<ListenerInfo> {
        self.routes::<E>()
            .iter()
            .map(|route| route.subscription.info())
            .collect()
    }

    /// Dispatch plan for `E`: own subscriptions and supertype subscriptions,
    /// merged by priority then registration order
    pub(crate) fn routes<E: Event>(&self) -> Vec<Route> {
        let lineage = self.lineage_of::<E>();

        let mut routes: Vec<Route> = self
            .snapshot(TypeId::of::<E>())
            .as_slice()
            .iter()
            .map(|sub| Route {
                subscription: Arc::clone(sub),
                project: None,
            })
            .collect();

        let mut merged = false;
        for ancestor in lineage.iter() {
            let subs = self.snapshot(ancestor.topic.id());
            if subs.is_empty() {
                continue;
            }
            merged = true;
            routes.extend(subs.as_slice().iter().map(|sub| Route {
                subscription: Arc::clone(sub),
                project: Some(Arc::clone(&ancestor.project)),
            }));
        }

        if merged {
            routes.sort_by_key(|route| route.subscription.order_key());
        }
        routes
    }

    /// Number of subscriptions filed directly under `E`
    pub fn subscription_count<E: Event>(&self) -> usize {
        self.snapshot(TypeId::of::<E>()).len()
    }

    /// Total subscriptions over all topics
    pub fn len(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Refuse further registrations and drop every subscription
    ///
    /// Returns how many subscriptions were removed, or `None` when the
    /// registry was already closed.
    pub fn close(&self) -> Option<usize> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.clear())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drop every subscription, deactivating them for in-flight publishes
    pub fn clear(&self) -> usize {
        let keys: Vec<TypeId> = self.topics.iter().map(|entry| *entry.key()).collect();
        let mut removed = 0;
        for key in keys {
            if let Some((_, subs)) = self.topics.remove(&key) {
                for sub in subs.as_slice() {
                    sub.deactivate();
                }
                removed += subs.len();
            }
        }
        removed
    }

    fn snapshot(&self, key: TypeId) -> TopicSubscriptions {
        self.topics
            .get(&key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn lineage_of<E: Event>(&self) -> Arc<[Ancestor]> {
        let key = TypeId::of::<E>();
        if let Some(cached) = self.lineages.get(&key).map(|entry| Arc::clone(entry.value())) {
            return cached;
        }
        let resolved: Arc<[Ancestor]> = E::lineage().into_ancestors().into();
        Arc::clone(self.lineages.entry(key).or_insert(resolved).value())
    }

    #[cfg(test)]
    pub(crate) fn topic_shape<E: Event>(&self) -> &'static str {
        match self.snapshot(TypeId::of::<E>()) {
            TopicSubscriptions::Empty => "empty",
            TopicSubscriptions::Single(_) => "single",
            TopicSubscriptions::Many(_) => "many",
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default(), 0)
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics.len())
            .field("subscriptions", &self.len())
            .field("duplicate_policy", &self.duplicate_policy)
            .finish()
    }
}
