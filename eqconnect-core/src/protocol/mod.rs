//! Text message grammar spoken over the framed connection.
//!
//! ```text
//! message := <type> ":" <rest>
//! ```
//!
//! Decoding mutates the filter store and playback state directly; encoding
//! reads them to build outbound messages.

pub mod message;

pub use message::MessageType;

use tracing::{debug, warn};

use crate::error::EqError;
use crate::state::filter::parse_decibels;
use crate::state::{FilterStore, PlaybackState};

/// Port the equalizer server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 2048;

/// Payload of the periodic liveness probe.
pub const KEEP_ALIVE: &str = "Keep alive check";

/// The server's answer to [`KEEP_ALIVE`].
pub const KEEP_ALIVE_ACK: &str = "Keep alive acknowledged";

/// Messages that never reach the application layer.
pub fn is_control_message(text: &str) -> bool {
    text.is_empty() || text == KEEP_ALIVE || text == KEEP_ALIVE_ACK
}

/// Translates between wire messages and the client state models.
pub struct MessageCodec<'a> {
    filters: &'a mut FilterStore,
    playback: &'a mut PlaybackState,
}

impl<'a> MessageCodec<'a> {
    pub fn new(filters: &'a mut FilterStore, playback: &'a mut PlaybackState) -> Self {
        Self { filters, playback }
    }

    /// Applies one inbound message.
    ///
    /// Unknown types and sub-commands are ignored. A message without a
    /// `:` separator is rejected.
    pub fn decode(&mut self, message: &str) -> Result<(), EqError> {
        let (kind, rest) = message
            .split_once(':')
            .ok_or_else(|| EqError::MalformedMessage(message.to_string()))?;

        match kind {
            "apply_filter" => self.filters.set_equalizer_applied(rest == "true"),
            "filter" => match rest {
                "added" => {
                    self.filters.add_filter(0.0);
                }
                "removed" => {
                    self.filters.remove_filter();
                }
                other => debug!(sub = other, "ignoring unknown filter message"),
            },
            "filters" => {
                if rest.is_empty() {
                    self.filters.set_gain_values(&[]);
                } else {
                    let gains: Vec<&str> = rest.split(',').collect();
                    self.filters.set_gains(&gains);
                }
            }
            "playback" => match rest {
                "play" => self.playback.set_playing(true),
                "pause" => self.playback.set_playing(false),
                other => debug!(sub = other, "ignoring playback message"),
            },
            "volume" => {
                let gain = parse_decibels("volume", rest)?;
                self.filters.set_preamp_gain(gain);
            }
            "track_changed" => {
                for part in rest.split(';').filter(|p| !p.is_empty()) {
                    if let Err(e) = self.decode(part) {
                        warn!(part, error = %e, "skipping track_changed field");
                    }
                }
            }
            "artist" => {
                self.playback.set_artist(rest);
            }
            "trackname" => {
                self.playback.set_title(rest);
            }
            other => debug!(kind = other, "ignoring unrecognized message"),
        }
        Ok(())
    }

    /// Builds the outbound message for `kind` from the current state.
    pub fn encode(&self, kind: MessageType) -> String {
        let prefix = kind.prefix();
        match kind {
            MessageType::TrackChanged => {
                let track = self.playback.track();
                format!("{prefix}:artist:{};trackname:{}", track.artist, track.title)
            }
            MessageType::FiltersGain => {
                let gains: Vec<String> = self
                    .filters
                    .gains()
                    .iter()
                    .map(|g| g.to_string())
                    .collect();
                format!("{prefix}:{}", gains.join(","))
            }
            MessageType::FilterRemoved => format!("{prefix}:removed"),
            MessageType::FilterAdded => format!("{prefix}:added"),
            MessageType::Play => format!("{prefix}:play"),
            MessageType::Pause => format!("{prefix}:pause"),
            MessageType::NextTrack => format!("{prefix}:next"),
            MessageType::PrevTrack => format!("{prefix}:previous"),
            MessageType::VolumeChanged => format!("{prefix}:{}", self.filters.preamp_gain()),
            MessageType::FilterApply => {
                format!("{prefix}:{}", self.filters.is_equalizer_applied())
            }
        }
    }
}
