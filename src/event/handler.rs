use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use super::events::{Event, Topic};
use super::subscription::SubscriptionHandle;

/// Errors a listener can report back to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error("listener failed: {0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// Create a plain failure
    pub fn failed(msg: impl Into<String>) -> Self {
        ListenerError::Failed(msg.into())
    }

    /// Wrap any error value as a failure, keeping only its message
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        ListenerError::Failed(err.to_string())
    }

    /// Short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            ListenerError::Failed(_) => "listener_failed",
            ListenerError::Panicked(_) => "listener_panicked",
        }
    }
}

/// A listener failure together with where it happened
#[derive(Debug, Clone, Error)]
#[error("listener '{listener}' failed while handling {event}: {error}")]
pub struct ListenerFailure {
    /// Display name of the failing subscription
    pub listener: String,
    pub subscription: SubscriptionHandle,
    /// Type of the event that was published
    pub event: Topic,
    #[source]
    pub error: ListenerError,
}

/// Per-invocation context handed to a listener
///
/// Gives access to routing details and lets the listener stop propagation
/// of cancellable events.
#[derive(Debug)]
pub struct Delivery {
    event: Topic,
    subscription: SubscriptionHandle,
    cancellable: bool,
    cancelled: bool,
}

impl Delivery {
    pub(crate) fn new(event: Topic, subscription: SubscriptionHandle, cancellable: bool) -> Self {
        Self {
            event,
            subscription,
            cancellable,
            cancelled: false,
        }
    }

    /// Type of the event as it was published
    pub fn event_topic(&self) -> Topic {
        self.event
    }

    /// Topic this listener subscribed to (a supertype for polymorphic deliveries)
    pub fn listener_topic(&self) -> Topic {
        self.subscription.topic()
    }

    pub fn subscription(&self) -> SubscriptionHandle {
        self.subscription
    }

    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Stop delivery to the remaining listeners
    ///
    /// Only honoured for events with [`Event::CANCELLABLE`] set. Returns
    /// whether propagation will actually stop.
    pub fn cancel(&mut self) -> bool {
        if !self.cancellable {
            warn!(
                event = %self.event,
                subscription = %self.subscription,
                "Ignoring cancel on a non-cancellable event"
            );
            return false;
        }
        self.cancelled = true;
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Trait for components that react to events of type `E`
///
/// Listeners run synchronously on the publishing thread, in priority order.
/// Returning an error does not stop other listeners unless the bus runs in
/// fail-fast mode.
pub trait Listener<E: Event>: Send + Sync {
    /// Handle one event
    fn handle(&self, event: &E, delivery: &mut Delivery) -> Result<(), ListenerError>;

    /// Human-readable name for logging and failure reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Function-backed listener
///
/// ```
/// use kawa::{Delivery, Event, ListenerFn};
///
/// struct Tick;
/// impl Event for Tick {}
///
/// let listener = ListenerFn::arc("tick-counter", |_tick: &Tick, _d: &mut Delivery| Ok(()));
/// ```
pub struct ListenerFn<E, F> {
    name: String,
    f: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> ListenerFn<E, F> {
    pub fn new(name: impl Into<String>, f: F) -> Self
    where
        E: Event,
        F: Fn(&E, &mut Delivery) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f,
            _event: PhantomData,
        }
    }

    /// Create the listener already wrapped in an [`Arc`]
    pub fn arc(name: impl Into<String>, f: F) -> Arc<Self>
    where
        E: Event,
        F: Fn(&E, &mut Delivery) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

impl<E, F> Listener<E> for ListenerFn<E, F>
where
    E: Event,
    F: Fn(&E, &mut Delivery) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn handle(&self, event: &E, delivery: &mut Delivery) -> Result<(), ListenerError> {
        (self.f)(event, delivery)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<E, F> fmt::Debug for ListenerFn<E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerFn")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A listener that accepts everything and does nothing
///
/// Useful in tests where a subscription has to exist but its behaviour is
/// irrelevant.
#[derive(Debug, Default)]
pub struct NoOpListener;

impl<E: Event> Listener<E> for NoOpListener {
    fn handle(&self, _event: &E, _delivery: &mut Delivery) -> Result<(), ListenerError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "NoOpListener"
    }
}
