// Public API - what other modules can use
pub use handlers::{
    close_room, create_room, get_room, join_room, leave_room, reset_votes, reveal_votes,
    start_timer, update_vote,
};

// Internal modules
pub mod cleanup_task;
mod handlers;
pub mod models;
pub mod store;
pub mod timer;
pub mod types;
