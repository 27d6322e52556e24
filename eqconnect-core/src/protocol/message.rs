//! Message kinds understood by the equalizer server.

use std::fmt;

// ── MessageType ──────────────────────────────────────────────────

/// Every outbound message the client can build.
///
/// Inbound messages share the same `<type>:<rest>` grammar and are
/// dispatched on the prefix by [`MessageCodec`](super::MessageCodec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `track_changed:artist:<a>;trackname:<t>`
    TrackChanged,
    /// `filters:<g1>,<g2>,...`
    FiltersGain,
    /// `filter:removed`
    FilterRemoved,
    /// `filter:added`
    FilterAdded,
    /// `playback:play`
    Play,
    /// `playback:pause`
    Pause,
    /// `volume:<db>`
    VolumeChanged,
    /// `apply_filter:true|false`
    FilterApply,
    /// `playback:next`
    NextTrack,
    /// `playback:previous`
    PrevTrack,
}

impl MessageType {
    pub const ALL: [MessageType; 10] = [
        MessageType::TrackChanged,
        MessageType::FiltersGain,
        MessageType::FilterRemoved,
        MessageType::FilterAdded,
        MessageType::Play,
        MessageType::Pause,
        MessageType::VolumeChanged,
        MessageType::FilterApply,
        MessageType::NextTrack,
        MessageType::PrevTrack,
    ];

    /// The `<type>` part of the message on the wire.
    pub fn prefix(&self) -> &'static str {
        match self {
            MessageType::TrackChanged => "track_changed",
            MessageType::FiltersGain => "filters",
            MessageType::FilterRemoved | MessageType::FilterAdded => "filter",
            MessageType::Play
            | MessageType::Pause
            | MessageType::NextTrack
            | MessageType::PrevTrack => "playback",
            MessageType::VolumeChanged => "volume",
            MessageType::FilterApply => "apply_filter",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
