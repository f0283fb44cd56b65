use std::sync::Arc;

use kawa::{
    BusError, Delivery, Event, EventBus, Lineage, Listener, ListenerError, SubscribeOptions,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
struct RoomEvent {
    room_id: String,
}
impl Event for RoomEvent {}

#[derive(Debug)]
struct ChatMessage {
    room: RoomEvent,
    author: String,
    text: String,
}
impl Event for ChatMessage {
    const CANCELLABLE: bool = true;

    fn lineage() -> Lineage<Self> {
        Lineage::root().extends(|e: &ChatMessage| &e.room)
    }
}

/// Drops chat messages containing banned words before anyone else sees them
struct ProfanityFilter {
    banned: Vec<&'static str>,
}

impl Listener<ChatMessage> for ProfanityFilter {
    fn handle(&self, event: &ChatMessage, delivery: &mut Delivery) -> Result<(), ListenerError> {
        if self.banned.iter().any(|word| event.text.contains(word)) {
            info!(author = %event.author, "Message blocked");
            delivery.cancel();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ProfanityFilter"
    }
}

fn main() -> Result<(), BusError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kawa=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kawa demo");

    let bus = EventBus::from_env()?;

    bus.subscribe_with(
        Arc::new(ProfanityFilter {
            banned: vec!["darn"],
        }),
        SubscribeOptions::<ChatMessage>::new().priority(100),
    )?;
    bus.subscribe_fn("chat-printer", |e: &ChatMessage, _: &mut Delivery| {
        info!(room = %e.room.room_id, author = %e.author, text = %e.text, "Chat");
        Ok(())
    })?;
    bus.subscribe_fn("activity-tracker", |e: &RoomEvent, _: &mut Delivery| {
        info!(room = %e.room_id, "Room activity");
        Ok(())
    })?;
    bus.subscribe_fn("flaky", |_: &RoomEvent, _: &mut Delivery| {
        Err(ListenerError::failed("downstream unavailable"))
    })?;

    for (author, text) in [("alice", "hello there"), ("bob", "darn it")] {
        let report = bus.publish(&ChatMessage {
            room: RoomEvent {
                room_id: "lobby".to_string(),
            },
            author: author.to_string(),
            text: text.to_string(),
        })?;
        info!(
            delivered = report.delivered,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Published chat message"
        );
    }

    bus.shutdown();
    Ok(())
}
