use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::{
    dispatcher::{DispatchReport, Dispatcher, ErrorHandler},
    events::Event,
    handler::{Delivery, Listener, ListenerError, ListenerFailure, ListenerFn},
    registry::SubscriptionRegistry,
    subscriber::{Registrar, Subscriber, SubscriberHandle},
    subscription::{ListenerInfo, SubscribeOptions, SubscriptionHandle},
};
use crate::config::{BusConfig, DuplicatePolicy, FailureMode};
use crate::shared::BusError;

struct BusInner {
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    config: BusConfig,
}

/// In-process, synchronous event bus
///
/// Cloning is cheap and every clone talks to the same registry, so a bus can
/// be handed to any component that needs to publish or subscribe. There is
/// no global instance.
///
/// ```
/// use kawa::{Delivery, Event, EventBus};
///
/// struct Greeted { name: String }
/// impl Event for Greeted {}
///
/// let bus = EventBus::new();
/// let handle = bus
///     .subscribe_fn("printer", |event: &Greeted, _: &mut Delivery| {
///         println!("hello {}", event.name);
///         Ok(())
///     })
///     .unwrap();
///
/// let report = bus.publish(&Greeted { name: "kawa".into() }).unwrap();
/// assert_eq!(report.delivered, 1);
///
/// bus.unsubscribe(&handle);
/// bus.unsubscribe(&handle); // harmless
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a new event bus with the default configuration
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Creates a bus configured from `KAWA_*` environment variables
    pub fn from_env() -> Result<Self, BusError> {
        Ok(Self::builder().with_config(BusConfig::from_env()?).build())
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribe `listener` to events of type `E` with default options
    pub fn subscribe<E, L>(&self, listener: Arc<L>) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        L: Listener<E> + ?Sized + 'static,
    {
        self.subscribe_with(listener, SubscribeOptions::new())
    }

    /// Subscribe `listener` with explicit priority, name or filter
    pub fn subscribe_with<E, L>(
        &self,
        listener: Arc<L>,
        options: SubscribeOptions<E>,
    ) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        L: Listener<E> + ?Sized + 'static,
    {
        self.ensure_open()?;
        self.inner.registry.register(listener, options)
    }

    /// Subscribe a closure under `name`
    pub fn subscribe_fn<E, F>(&self, name: &str, f: F) -> Result<SubscriptionHandle, BusError>
    where
        E: Event,
        F: Fn(&E, &mut Delivery) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe::<E, _>(ListenerFn::arc(name, f))
    }

    /// Remove a subscription; unknown or stale handles are ignored
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.inner.registry.unregister(handle);
        if !removed {
            debug!(subscription = %handle, "Unsubscribe of unknown subscription ignored");
        }
        removed
    }

    /// Remove a subscription, failing if the handle is unknown
    pub fn try_unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), BusError> {
        self.inner.registry.try_unregister(handle)
    }

    /// Deliver `event` to every listener of its type and supertypes
    ///
    /// Blocks until all listeners have run (or one cancelled propagation).
    #[instrument(skip_all)]
    pub fn publish<E: Event>(&self, event: &E) -> Result<DispatchReport, BusError> {
        self.ensure_open()?;
        self.inner.dispatcher.post(&self.inner.registry, event)
    }

    /// Register every subscription a [`Subscriber`] asks for, as one unit
    ///
    /// If the subscriber fails half way, the subscriptions it already made
    /// are removed again before the error is returned.
    pub fn register<S: Subscriber>(&self, subscriber: Arc<S>) -> Result<SubscriberHandle, BusError> {
        self.ensure_open()?;
        let name = subscriber.name().to_string();
        let mut registrar = Registrar::new(&self.inner.registry);

        match subscriber.subscribe(&mut registrar) {
            Ok(()) => {
                let handles = registrar.into_handles();
                info!(
                    subscriber = %name,
                    subscriptions = handles.len(),
                    "Registered subscriber"
                );
                Ok(SubscriberHandle::new(name, handles))
            }
            Err(e) => {
                let handles = registrar.into_handles();
                for handle in &handles {
                    self.inner.registry.unregister(handle);
                }
                info!(
                    subscriber = %name,
                    rolled_back = handles.len(),
                    error = %e,
                    "Subscriber registration failed"
                );
                Err(e)
            }
        }
    }

    /// Remove all subscriptions of a registered subscriber; returns how many
    /// were still present
    pub fn unregister(&self, handle: &SubscriberHandle) -> usize {
        let removed = handle
            .subscriptions()
            .iter()
            .filter(|sub| self.inner.registry.unregister(sub))
            .count();
        debug!(
            subscriber = %handle.name(),
            removed = removed,
            "Unregistered subscriber"
        );
        removed
    }

    /// Listeners that would receive an event of type `E`, in dispatch order
    pub fn listeners<E: Event>(&self) -> Vec<ListenerInfo> {
        self.inner.registry.lookup::<E>()
    }

    /// Subscriptions filed directly under `E` (supertypes not counted)
    pub fn subscription_count<E: Event>(&self) -> usize {
        self.inner.registry.subscription_count::<E>()
    }

    pub fn has_listeners<E: Event>(&self) -> bool {
        !self.listeners::<E>().is_empty()
    }

    /// Total number of subscriptions across all event types
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Close the bus and drop every subscription
    ///
    /// Idempotent. Publishing or subscribing afterwards fails with
    /// [`BusError::Closed`].
    pub fn shutdown(&self) {
        if let Some(removed) = self.inner.registry.close() {
            info!(removed = removed, "Event bus shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.registry.is_closed()
    }

    fn ensure_open(&self) -> Result<(), BusError> {
        if self.is_closed() {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("registry", &self.inner.registry)
            .field("dispatcher", &self.inner.dispatcher)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`EventBus`]
pub struct EventBusBuilder {
    config: BusConfig,
    error_handler: Option<ErrorHandler>,
}

impl EventBusBuilder {
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
            error_handler: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.config.failure_mode = mode;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Whether listener panics are caught and reported as failures
    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.config.catch_panics = enabled;
        self
    }

    /// Receive listener failures instead of having them logged
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ListenerFailure) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> EventBus {
        let registry =
            SubscriptionRegistry::new(self.config.duplicate_policy, self.config.default_priority);
        let mut dispatcher = Dispatcher::new(&self.config);
        if let Some(handler) = self.error_handler {
            dispatcher = dispatcher.with_error_handler(handler);
        }

        debug!(
            failure_mode = %self.config.failure_mode,
            duplicate_policy = %self.config.duplicate_policy,
            catch_panics = self.config.catch_panics,
            "Creating event bus"
        );

        EventBus {
            inner: Arc::new(BusInner {
                registry,
                dispatcher,
                config: self.config,
            }),
        }
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusBuilder")
            .field("config", &self.config)
            .field("custom_error_handler", &self.error_handler.is_some())
            .finish()
    }
}
