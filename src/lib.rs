//! # kawa
//!
//! A small, synchronous, in-process event bus.
//!
//! Listeners subscribe to an event *type*. Publishing an event runs every
//! listener of that type, and of the supertypes the event declares, on the
//! publishing thread in priority order.
//!
//! ```text
//!   publish(&event)
//!        │
//!        ▼
//!   EventBus ──► SubscriptionRegistry::routes::<E>()
//!        │          (own topic + lineage topics, merged by priority)
//!        ▼
//!   Dispatcher ──► listener 1 ──► listener 2 ──► ... ──► DispatchReport
//!                    │ Err / panic: reported, dispatch continues
//!                    │ delivery.cancel(): stops (cancellable events only)
//! ```
//!
//! ## Example
//! ```rust
//! use kawa::{Delivery, Event, EventBus, Lineage};
//!
//! struct RoomEvent { room_id: String }
//! impl Event for RoomEvent {}
//!
//! struct PlayerJoined { room: RoomEvent, player: String }
//! impl Event for PlayerJoined {
//!     fn lineage() -> Lineage<Self> {
//!         Lineage::root().extends(|e: &PlayerJoined| &e.room)
//!     }
//! }
//!
//! let bus = EventBus::new();
//!
//! // Sees every room event, including PlayerJoined.
//! bus.subscribe_fn("activity", |e: &RoomEvent, _: &mut Delivery| {
//!     println!("activity in {}", e.room_id);
//!     Ok(())
//! })?;
//!
//! let report = bus.publish(&PlayerJoined {
//!     room: RoomEvent { room_id: "lobby".into() },
//!     player: "alice".into(),
//! })?;
//! assert_eq!(report.delivered, 1);
//! # Ok::<(), kawa::BusError>(())
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types                                  |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Facade**        | Subscribe, unsubscribe, publish, lifecycle                    | [`EventBus`], [`EventBusBuilder`]          |
//! | **Events**        | Type identity and declared supertypes                         | [`Event`], [`Topic`], [`Lineage`]          |
//! | **Listeners**     | Trait, closure adapter, per-delivery context                  | [`Listener`], [`ListenerFn`], [`Delivery`] |
//! | **Groups**        | Register and remove a set of subscriptions as one unit        | [`Subscriber`], [`SubscriberHandle`]       |
//! | **Configuration** | Failure mode, duplicates, panic isolation, default priority   | [`BusConfig`]                              |
//! | **Errors**        | Typed errors with stable labels                               | [`BusError`], [`ListenerError`]            |

pub mod config;
pub mod event;
pub mod shared;

// Re-export commonly used types
pub use config::{BusConfig, DuplicatePolicy, FailureMode};
pub use event::{
    Delivery, DispatchReport, Dispatcher, ErrorHandler, Event, EventBus, EventBusBuilder,
    EventFilter, Lineage, Listener, ListenerError, ListenerFailure, ListenerFn, ListenerInfo,
    NoOpListener, Registrar, SubscribeOptions, Subscriber, SubscriberHandle, SubscriptionHandle,
    SubscriptionId, SubscriptionRegistry, Topic,
};
pub use shared::BusError;
