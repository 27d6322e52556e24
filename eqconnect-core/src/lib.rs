//! # eqconnect-core
//!
//! Client library for remote-controlling an equalizer server over TCP.
//!
//! This crate contains:
//! - **Codec**: `FrameCodec`, length-prefixed UTF-8 frames for `tokio_util`
//! - **Network**: `Transport` (socket, read loop, bounded retries) and
//!   `Session` (lifecycle, keep-alive, rate limiting, reconnect)
//! - **Protocol**: `MessageCodec`, the `<type>:<rest>` text grammar
//! - **State**: `FilterStore`, `PlaybackState` and the `ConnectionPhase`
//!   state machine
//! - **Settings**: `KeyValueStore` with JSON-file and in-memory backends
//! - **Client**: `EqualizerClient`, the single owner of session and state
//! - **Error**: `EqError`, a `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod error;
pub mod events;
pub mod network;
pub mod protocol;
pub mod settings;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{ClientEvent, EqualizerClient, Intent};
pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use error::EqError;
pub use events::EventBus;
pub use network::{
    Endpoint, SendOutcome, Session, SessionConfig, SessionEvent, Transport, TransportConfig,
    TransportEvent,
};
pub use protocol::{DEFAULT_PORT, KEEP_ALIVE, KEEP_ALIVE_ACK, MessageCodec, MessageType};
pub use settings::{JsonFileStore, KeyValueStore, LAST_ADDRESS, MemoryStore};
pub use state::{
    BandParameters, ConnectionPhase, Filter, FilterEvent, FilterStore, PlaybackEvent,
    PlaybackState, Track, TrackField,
};
