//! Now-playing metadata mirrored from the server.

use crate::events::EventBus;

/// Which part of the track metadata changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackField {
    Artist,
    Title,
}

impl TrackField {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub artist: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackChanged { field: TrackField, value: String },
    PlayingChanged(bool),
}

/// Current track and play/pause flag.
#[derive(Debug, Default)]
pub struct PlaybackState {
    track: Track,
    is_playing: bool,
    events: EventBus<PlaybackEvent>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Returns `true` and notifies if the artist differs from the current one.
    pub fn set_artist(&mut self, artist: impl Into<String>) -> bool {
        let artist = artist.into();
        if self.track.artist == artist {
            return false;
        }
        self.track.artist = artist.clone();
        self.events.publish(PlaybackEvent::TrackChanged {
            field: TrackField::Artist,
            value: artist,
        });
        true
    }

    /// Returns `true` and notifies if the title differs from the current one.
    pub fn set_title(&mut self, title: impl Into<String>) -> bool {
        let title = title.into();
        if self.track.title == title {
            return false;
        }
        self.track.title = title.clone();
        self.events.publish(PlaybackEvent::TrackChanged {
            field: TrackField::Title,
            value: title,
        });
        true
    }

    pub fn set_track(&mut self, track: Track) {
        self.set_artist(track.artist);
        self.set_title(track.title);
    }

    /// Always notifies, even when the flag is unchanged.
    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
        self.events.publish(PlaybackEvent::PlayingChanged(playing));
    }
}
