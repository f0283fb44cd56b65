pub mod events;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use events::{chat, player_joined, ChatMessage, PlayerEvent, PlayerJoined, RoomEvent, Tick};
#[allow(unused_imports)]
pub use mocks::{Behaviour, CallLog, RecordingListener};
#[allow(unused_imports)]
pub use setup::{init_tracing, TestSetup, TestSetupBuilder};
