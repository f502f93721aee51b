pub mod mocks;
pub mod setup;

pub use mocks::RecordingBroadcaster;
pub use setup::TestApp;
