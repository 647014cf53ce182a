// ABOUTME: Tutorial terminal sessions
// Coordinators per user identity, the connection multiplexer and the transport seam

pub mod coordinator;
pub mod events;
pub mod multiplexer;
pub mod transport;
pub mod validation;

pub use coordinator::{Coordinator, SessionServices, SessionState};
pub use events::{ClientEvent, ServerEvent, SocketError};
pub use multiplexer::Multiplexer;
pub use transport::{ChannelTransport, Outlet, Transport, TransportError};
pub use validation::{BatchSender, ValidationBatch, ValidationQueue};
