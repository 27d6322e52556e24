//! Connection to the equalizer server.
//!
//! - [`transport`]: framed socket, read loop, bounded connect/send retries
//! - [`session`]: lifecycle, keep-alive, rate limiting, reconnect on send

pub mod session;
pub mod transport;

pub use session::{SendOutcome, Session, SessionConfig, SessionEvent};
pub use transport::{Endpoint, Transport, TransportConfig, TransportEvent};
