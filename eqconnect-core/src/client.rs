//! Application root: owns the session and the state models.
//!
//! UI code talks to the client in two directions. It submits [`Intent`]s,
//! which are applied to local state and forwarded to the server, and it
//! subscribes to [`ClientEvent`]s plus the filter and playback buses.
//! Inbound server messages are decoded here, on the task that owns the
//! state, so models are never touched concurrently.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::EqError;
use crate::events::EventBus;
use crate::network::{
    Endpoint, SendOutcome, Session, SessionConfig, SessionEvent, TransportConfig,
};
use crate::protocol::{MessageCodec, MessageType};
use crate::state::{FilterStore, PlaybackState};

/// A user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// A band gain edit. `commit` marks the final value of a gesture,
    /// which is never dropped by the rate limit.
    SetFilterGain { index: usize, gain: f64, commit: bool },
    /// Flatten every band.
    ZeroFilters,
    AddFilter,
    RemoveFilter,
    SetPreamp { gain: f64, commit: bool },
    ApplyEqualizer(bool),
    Play,
    Pause,
    NextTrack,
    PreviousTrack,
    /// Close the session, typically after a [`ClientEvent::ConnectionLost`].
    Disconnect,
}

impl Intent {
    /// Intermediate slider values may be dropped by the rate limit.
    /// Committed values and discrete actions are always sent.
    pub fn is_important(&self) -> bool {
        match self {
            Intent::SetFilterGain { commit, .. } | Intent::SetPreamp { commit, .. } => *commit,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected(Endpoint),
    Disconnected,
    ConnectionLost { reason: String },
    /// An inbound message could not be applied.
    MessageRejected { message: String, reason: String },
}

pub struct EqualizerClient {
    session: Session,
    filters: FilterStore,
    playback: PlaybackState,
    events: EventBus<ClientEvent>,
}

impl EqualizerClient {
    pub fn new(transport: TransportConfig, session: SessionConfig) -> Self {
        Self {
            session: Session::new(transport, session),
            filters: FilterStore::new(),
            playback: PlaybackState::new(),
            events: EventBus::new(),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn codec(&mut self) -> MessageCodec<'_> {
        MessageCodec::new(&mut self.filters, &mut self.playback)
    }

    pub async fn connect(&mut self, endpoint: Endpoint) -> Result<(), EqError> {
        self.session.connect(endpoint).await
    }

    pub async fn disconnect(&mut self) {
        self.session.side_disconnect().await;
    }

    /// Applies `intent` locally and sends the matching message.
    ///
    /// Returns [`SendOutcome::Blocked`] when the intent changed nothing,
    /// e.g. a gain edit on a locked band. A committed gain is sent even
    /// when it is within [`GAIN_ACCURACY`] of the local value, since an
    /// earlier uncommitted edit may have been rate limited.
    ///
    /// [`GAIN_ACCURACY`]: crate::state::filter::GAIN_ACCURACY
    pub async fn apply(&mut self, intent: Intent) -> Result<SendOutcome, EqError> {
        let important = intent.is_important();
        let kind = match intent {
            Intent::SetFilterGain {
                index,
                gain,
                commit,
            } => {
                let changed = self.filters.set_filter_gain(index, gain)?;
                let locked = self.filters.filter(index).is_some_and(|f| f.is_locked());
                if locked || !(changed || commit) {
                    return Ok(SendOutcome::Blocked);
                }
                MessageType::FiltersGain
            }
            Intent::ZeroFilters => {
                let zeros = vec![0.0; self.filters.len()];
                self.filters.set_gain_values(&zeros);
                MessageType::FiltersGain
            }
            Intent::AddFilter => {
                self.filters.add_filter(0.0);
                MessageType::FilterAdded
            }
            Intent::RemoveFilter => {
                if self.filters.remove_filter().is_none() {
                    return Ok(SendOutcome::Blocked);
                }
                MessageType::FilterRemoved
            }
            Intent::SetPreamp { gain, .. } => {
                self.filters.set_preamp_gain(gain);
                MessageType::VolumeChanged
            }
            Intent::ApplyEqualizer(applied) => {
                self.filters.set_equalizer_applied(applied);
                MessageType::FilterApply
            }
            Intent::Play => MessageType::Play,
            Intent::Pause => MessageType::Pause,
            Intent::NextTrack => MessageType::NextTrack,
            Intent::PreviousTrack => MessageType::PrevTrack,
            Intent::Disconnect => {
                self.disconnect().await;
                return Ok(SendOutcome::Disconnected);
            }
        };

        let message = self.codec().encode(kind);
        debug!(%kind, important, message = %message, "sending");
        self.session.send(&message, important).await
    }

    /// Waits for the next session event, applying server messages to the
    /// state models. Returns `None` once the session is gone.
    pub async fn poll(&mut self) -> Option<SessionEvent> {
        let event = self.session.recv().await?;
        match &event {
            SessionEvent::Connected(endpoint) => {
                self.events.publish(ClientEvent::Connected(endpoint.clone()));
            }
            SessionEvent::MessageReceived(text) => {
                if let Err(e) = self.codec().decode(text) {
                    warn!(message = %text, error = %e, "rejected server message");
                    self.events.publish(ClientEvent::MessageRejected {
                        message: text.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            SessionEvent::ConnectionLost { reason } => {
                self.events.publish(ClientEvent::ConnectionLost {
                    reason: reason.clone(),
                });
            }
            SessionEvent::Disconnected => self.events.publish(ClientEvent::Disconnected),
        }
        Some(event)
    }

    /// Drives the client until `intents` closes, then disconnects.
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        loop {
            tokio::select! {
                event = self.poll() => {
                    if event.is_none() {
                        break;
                    }
                }
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        let label = format!("{intent:?}");
                        match self.apply(intent).await {
                            Ok(outcome) => debug!(intent = %label, ?outcome, "intent applied"),
                            Err(e) => warn!(intent = %label, error = %e, "intent failed"),
                        }
                    }
                    None => break,
                },
            }
        }

        info!("client shutting down");
        let was_connected = self.session.is_connected();
        self.session.close().await;
        if was_connected {
            self.events.publish(ClientEvent::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FilterEvent;

    fn client() -> EqualizerClient {
        EqualizerClient::new(TransportConfig::default(), SessionConfig::default())
    }

    #[test]
    fn importance_follows_control_kind() {
        let drag = Intent::SetFilterGain {
            index: 0,
            gain: 1.0,
            commit: false,
        };
        let release = Intent::SetFilterGain {
            index: 0,
            gain: 1.0,
            commit: true,
        };
        assert!(!drag.is_important());
        assert!(release.is_important());
        assert!(!Intent::SetPreamp { gain: 1.0, commit: false }.is_important());
        assert!(Intent::SetPreamp { gain: 1.0, commit: true }.is_important());
        assert!(Intent::AddFilter.is_important());
        assert!(Intent::Play.is_important());
        assert!(Intent::ApplyEqualizer(true).is_important());
    }

    #[tokio::test]
    async fn intents_update_local_state_while_offline() {
        let mut client = client();
        let mut rx = client.filters().subscribe();

        let outcome = client.apply(Intent::AddFilter).await.unwrap();
        assert_eq!(outcome, SendOutcome::Disconnected);
        assert_eq!(client.filters().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), FilterEvent::Added(vec![0]));

        client
            .apply(Intent::SetPreamp {
                gain: 4.0,
                commit: true,
            })
            .await
            .unwrap();
        assert_eq!(client.filters().preamp_gain(), 4.0);
    }

    #[tokio::test]
    async fn locked_band_blocks_gain_intent() {
        let mut client = client();
        client.apply(Intent::AddFilter).await.unwrap();
        client.filters.set_filter_locked(0, true).unwrap();

        let outcome = client
            .apply(Intent::SetFilterGain {
                index: 0,
                gain: 3.0,
                commit: true,
            })
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::Blocked);
    }

    #[tokio::test]
    async fn gain_intent_on_missing_band_errors() {
        let mut client = client();
        assert!(matches!(
            client
                .apply(Intent::SetFilterGain {
                    index: 2,
                    gain: 1.0,
                    commit: true,
                })
                .await,
            Err(EqError::NoSuchFilter(2))
        ));
    }

    #[tokio::test]
    async fn zero_filters_flattens_bands() {
        let mut client = client();
        client.filters.set_gain_values(&[3.0, -2.0]);
        client.apply(Intent::ZeroFilters).await.unwrap();
        assert_eq!(client.filters().gains(), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn remove_on_empty_is_blocked() {
        let mut client = client();
        assert_eq!(
            client.apply(Intent::RemoveFilter).await.unwrap(),
            SendOutcome::Blocked
        );
    }
}
