use std::sync::Arc;

use super::{
    events::Event,
    handler::{Delivery, Listener, ListenerError, ListenerFn},
    registry::SubscriptionRegistry,
    subscription::{SubscribeOptions, SubscriptionHandle},
};
use crate::shared::BusError;

/// A component owning several subscriptions that come and go together
///
/// Implementors declare their subscriptions in [`Subscriber::subscribe`];
/// [`EventBus::register`](super::EventBus::register) records them under one
/// [`SubscriberHandle`].
///
/// ```
/// use std::sync::Arc;
/// use kawa::{BusError, Delivery, Event, EventBus, Registrar, Subscriber};
///
/// struct Opened;
/// impl Event for Opened {}
/// struct Closed;
/// impl Event for Closed {}
///
/// struct DoorLog;
///
/// impl Subscriber for DoorLog {
///     fn subscribe(self: Arc<Self>, registrar: &mut Registrar<'_>) -> Result<(), BusError> {
///         registrar
///             .listen_fn("door-opened", 0, |_: &Opened, _: &mut Delivery| Ok(()))?
///             .listen_fn("door-closed", 0, |_: &Closed, _: &mut Delivery| Ok(()))?;
///         Ok(())
///     }
/// }
///
/// let bus = EventBus::new();
/// let handle = bus.register(Arc::new(DoorLog)).unwrap();
/// assert_eq!(handle.len(), 2);
/// assert_eq!(bus.unregister(&handle), 2);
/// ```
pub trait Subscriber: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Declare this subscriber's subscriptions
    fn subscribe(self: Arc<Self>, registrar: &mut Registrar<'_>) -> Result<(), BusError>;
}

/// Collects the subscriptions of one [`Subscriber`] while it registers
pub struct Registrar<'a> {
    registry: &'a SubscriptionRegistry,
    handles: Vec<SubscriptionHandle>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(registry: &'a SubscriptionRegistry) -> Self {
        Self {
            registry,
            handles: Vec::new(),
        }
    }

    /// Subscribe `listener` to `E` as part of this group
    pub fn listen<E, L>(
        &mut self,
        listener: Arc<L>,
        options: SubscribeOptions<E>,
    ) -> Result<&mut Self, BusError>
    where
        E: Event,
        L: Listener<E> + ?Sized + 'static,
    {
        let registration = self.registry.register_entry(listener, options)?;
        // A reused subscription belongs to whoever created it first.
        if registration.created {
            self.handles.push(registration.handle);
        }
        Ok(self)
    }

    /// Subscribe a closure to `E` as part of this group
    pub fn listen_fn<E, F>(
        &mut self,
        name: &str,
        priority: i32,
        f: F,
    ) -> Result<&mut Self, BusError>
    where
        E: Event,
        F: Fn(&E, &mut Delivery) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.listen(
            ListenerFn::arc(name, f),
            SubscribeOptions::<E>::new().priority(priority),
        )
    }

    /// Handles created so far
    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }

    pub(crate) fn into_handles(self) -> Vec<SubscriptionHandle> {
        self.handles
    }
}

/// Handle to all subscriptions made by one registered [`Subscriber`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberHandle {
    name: String,
    subscriptions: Vec<SubscriptionHandle>,
}

impl SubscriberHandle {
    pub(crate) fn new(name: String, subscriptions: Vec<SubscriptionHandle>) -> Self {
        Self {
            name,
            subscriptions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriptions(&self) -> &[SubscriptionHandle] {
        &self.subscriptions
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::event::EventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Login;
    impl Event for Login {}

    struct Logout;
    impl Event for Logout {}

    #[derive(Default)]
    struct SessionCounter {
        active: AtomicUsize,
    }

    impl Listener<Login> for SessionCounter {
        fn handle(&self, _: &Login, _: &mut Delivery) -> Result<(), ListenerError> {
            self.active.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Listener<Logout> for SessionCounter {
        fn handle(&self, _: &Logout, _: &mut Delivery) -> Result<(), ListenerError> {
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Subscriber for SessionCounter {
        fn name(&self) -> &str {
            "session-counter"
        }

        fn subscribe(self: Arc<Self>, registrar: &mut Registrar<'_>) -> Result<(), BusError> {
            registrar
                .listen::<Login, _>(Arc::clone(&self), SubscribeOptions::new())?
                .listen::<Logout, _>(self, SubscribeOptions::new())?;
            Ok(())
        }
    }

    /// Subscribes the same listener twice so a rejecting bus fails half way
    #[derive(Default)]
    struct Greedy {
        /// Handles the registrar held once both listens went through
        owned: AtomicUsize,
    }

    impl Subscriber for Greedy {
        fn subscribe(self: Arc<Self>, registrar: &mut Registrar<'_>) -> Result<(), BusError> {
            let listener = ListenerFn::arc("greedy", |_: &Login, _: &mut Delivery| Ok(()));
            registrar
                .listen(Arc::clone(&listener), SubscribeOptions::<Login>::new())?
                .listen(listener, SubscribeOptions::<Login>::new())?;
            self.owned.store(registrar.handles().len(), Ordering::SeqCst);
            Ok(())
        }
    }

    /// Shuts the bus down between starting and finishing its registration
    struct Saboteur {
        bus: EventBus,
    }

    impl Subscriber for Saboteur {
        fn subscribe(self: Arc<Self>, registrar: &mut Registrar<'_>) -> Result<(), BusError> {
            registrar.listen_fn("before", 0, |_: &Login, _: &mut Delivery| Ok(()))?;
            self.bus.shutdown();
            registrar.listen_fn("after", 0, |_: &Logout, _: &mut Delivery| Ok(()))?;
            Ok(())
        }
    }

    #[test]
    fn test_subscriber_receives_all_declared_events() {
        let bus = EventBus::new();
        let counter = Arc::new(SessionCounter::default());

        let handle = bus.register(Arc::clone(&counter)).unwrap();
        bus.publish(&Login).unwrap();
        bus.publish(&Login).unwrap();
        bus.publish(&Logout).unwrap();

        assert_eq!(handle.name(), "session-counter");
        assert_eq!(handle.len(), 2);
        assert_eq!(counter.active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_removes_whole_group_once() {
        let bus = EventBus::new();
        let handle = bus.register(Arc::new(SessionCounter::default())).unwrap();

        assert_eq!(bus.unregister(&handle), 2);
        assert_eq!(bus.unregister(&handle), 0);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_failed_registration_rolls_back() {
        let bus = EventBus::builder()
            .with_duplicate_policy(DuplicatePolicy::Reject)
            .build();

        let err = bus.register(Arc::new(Greedy::default())).unwrap_err();

        assert!(matches!(err, BusError::DuplicateRegistration { .. }));
        assert!(bus.is_empty());
    }

    #[test]
    fn test_reused_subscriptions_stay_with_their_owner() {
        let bus = EventBus::new();
        let greedy = Arc::new(Greedy::default());
        let handle = bus.register(Arc::clone(&greedy)).unwrap();

        // The second listen reused the first subscription.
        assert_eq!(greedy.owned.load(Ordering::SeqCst), 1);
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.subscriptions()[0], bus.listeners::<Login>()[0].handle);
        assert_eq!(bus.subscription_count::<Login>(), 1);
    }

    #[test]
    fn test_shutdown_during_registration_leaves_nothing_behind() {
        let bus = EventBus::new();
        let saboteur = Arc::new(Saboteur { bus: bus.clone() });

        let err = bus.register(saboteur).unwrap_err();

        assert!(matches!(err, BusError::Closed));
        assert!(bus.is_closed());
        assert!(bus.is_empty());
    }
}
