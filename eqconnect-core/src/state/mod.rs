pub mod connection;
pub mod filter;
pub mod filters;
pub mod playback;

pub use connection::ConnectionPhase;
pub use filter::{BandParameters, Filter};
pub use filters::{FilterEvent, FilterStore};
pub use playback::{PlaybackEvent, PlaybackState, Track, TrackField};
