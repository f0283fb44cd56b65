use kawa::{Event, Lineage};

// ============================================================================
// Fixture event hierarchy
//
//   RoomEvent ◄── PlayerEvent ◄── PlayerJoined
//       ▲
//       └──────── ChatMessage (cancellable)
// ============================================================================

#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub room_id: String,
}
impl Event for RoomEvent {}

#[derive(Debug, Clone)]
pub struct PlayerEvent {
    pub room: RoomEvent,
    pub player: String,
}
impl Event for PlayerEvent {
    fn lineage() -> Lineage<Self> {
        Lineage::root().extends(|e: &PlayerEvent| &e.room)
    }
}

#[derive(Debug, Clone)]
pub struct PlayerJoined {
    pub player: PlayerEvent,
    pub seat: usize,
}
impl Event for PlayerJoined {
    fn lineage() -> Lineage<Self> {
        Lineage::root().extends(|e: &PlayerJoined| &e.player)
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub room: RoomEvent,
    pub text: String,
}
impl Event for ChatMessage {
    const CANCELLABLE: bool = true;

    fn lineage() -> Lineage<Self> {
        Lineage::root().extends(|e: &ChatMessage| &e.room)
    }
}

/// Standalone event with no supertypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick(pub u64);
impl Event for Tick {}

#[allow(dead_code)]
pub fn player_joined(room_id: &str, player: &str, seat: usize) -> PlayerJoined {
    PlayerJoined {
        player: PlayerEvent {
            room: RoomEvent {
                room_id: room_id.to_string(),
            },
            player: player.to_string(),
        },
        seat,
    }
}

#[allow(dead_code)]
pub fn chat(room_id: &str, text: &str) -> ChatMessage {
    ChatMessage {
        room: RoomEvent {
            room_id: room_id.to_string(),
        },
        text: text.to_string(),
    }
}
