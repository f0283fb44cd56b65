use thiserror::Error;

use crate::event::{ListenerFailure, SubscriptionId, Topic};

/// Errors surfaced by the event bus
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum BusError {
    /// A listener failed and the bus runs in fail-fast mode
    #[error(transparent)]
    ListenerInvocation(#[from] ListenerFailure),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("Duplicate registration of '{listener}' on {topic} (existing subscription {existing})")]
    DuplicateRegistration {
        listener: String,
        topic: Topic,
        existing: SubscriptionId,
    },

    #[error("Event bus is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BusError {
    /// Short stable label (snake_case) for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::ListenerInvocation(_) => "listener_invocation",
            BusError::UnknownSubscription(_) => "unknown_subscription",
            BusError::DuplicateRegistration { .. } => "duplicate_registration",
            BusError::Closed => "bus_closed",
            BusError::Config(_) => "invalid_config",
        }
    }
}
