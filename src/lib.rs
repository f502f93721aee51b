// Library crate for the sprint planner server
// This file exposes the public API for integration tests

pub mod room;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use room::models::{Room, RoomTimer, Voter, NO_VOTE};
pub use room::store::{InMemoryRoomStore, RoomStore, VoteResult};
pub use shared::{AppError, AppState};
pub use websockets::{Broadcaster, Envelope, EventType, InMemoryBroadcaster};
