// Public API
pub use broadcaster::{send_event, Broadcaster, InMemoryBroadcaster};
pub use handler::{websocket_handler, RelayHandler};
pub use messages::{Envelope, EventType};
pub use socket::{Connection, InboundHandler, SocketTransport, TransportError};

// Internal modules
pub mod broadcaster;
mod handler;
pub mod messages;
mod socket;
