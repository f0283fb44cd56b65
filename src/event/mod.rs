// Event bus components
//
// The registry stores subscriptions keyed by event type, the dispatcher
// routes a published event to them, and the bus ties both together.

// Public API - what other modules can use
pub use bus::{EventBus, EventBusBuilder};
pub use dispatcher::{log_failure, DispatchReport, Dispatcher, ErrorHandler};
pub use events::{Event, Lineage, Topic};
pub use handler::{Delivery, Listener, ListenerError, ListenerFailure, ListenerFn, NoOpListener};
pub use registry::SubscriptionRegistry;
pub use subscriber::{Registrar, Subscriber, SubscriberHandle};
pub use subscription::{
    EventFilter, ListenerInfo, SubscribeOptions, SubscriptionHandle, SubscriptionId,
};

// Internal modules
mod bus;
mod dispatcher;
mod events;
mod handler;
mod registry;
mod subscriber;
mod subscription;
