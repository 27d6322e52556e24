//! Server session: connection lifecycle, keep-alive and send policy.
//!
//! The session wraps a [`Transport`] and adds what the application needs
//! on top of a raw socket:
//! - a [`ConnectionPhase`] that emits exactly one `Disconnected` per close
//! - a periodic keep-alive so the server notices a dead client
//! - a rate limit for non-important sends
//! - one reconnect-and-resend when a send finds the link gone

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::EqError;
use crate::network::transport::{Endpoint, Transport, TransportConfig, TransportEvent};
use crate::protocol::{KEEP_ALIVE, is_control_message};
use crate::state::ConnectionPhase;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub keep_alive_interval: Duration,
    /// Minimum spacing of non-important sends.
    pub rate_limit: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_millis(1000),
            rate_limit: Duration::from_millis(10),
        }
    }
}

/// Result of a send that did not hit a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Dropped by the rate limit, or there was nothing to send.
    Blocked,
    /// The link is gone and a reconnect did not bring it back.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected(Endpoint),
    MessageReceived(String),
    /// A send found the link dead and the reconnect failed. The session is
    /// still nominally open; the owner decides whether to close it.
    ConnectionLost { reason: String },
    Disconnected,
}

struct Shared {
    transport: Transport,
    config: SessionConfig,
    phase: Mutex<ConnectionPhase>,
    last_send: Mutex<Option<Instant>>,
    notify_tx: mpsc::UnboundedSender<SessionEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn phase(&self) -> ConnectionPhase {
        lock(&self.phase).clone()
    }

    /// Applies the rate limit, then sends with one reconnect on link loss.
    async fn send(&self, data: &str, important: bool) -> Result<SendOutcome, EqError> {
        if !self.phase().is_connected() {
            debug!("send while not connected");
            return Ok(SendOutcome::Disconnected);
        }

        {
            let mut last_send = lock(&self.last_send);
            if !important
                && last_send.is_some_and(|at| at.elapsed() < self.config.rate_limit)
            {
                trace!(data, "send blocked by rate limit");
                return Ok(SendOutcome::Blocked);
            }
            *last_send = Some(Instant::now());
        }

        let error = match self.transport.send(data).await {
            Ok(()) => return Ok(SendOutcome::Sent),
            Err(e) if e.is_disconnect() => e,
            Err(e) => return Err(e),
        };

        if !self.phase().is_connected() {
            debug!(error = %error, "send failed after close");
            return Ok(SendOutcome::Disconnected);
        }

        warn!(error = %error, "send failed, reconnecting");
        let retry = match self.transport.reconnect().await {
            // A close that raced the reconnect wins.
            Ok(()) if !self.phase().is_connected() => {
                self.transport.close().await;
                return Ok(SendOutcome::Disconnected);
            }
            Ok(()) => self.transport.send(data).await,
            Err(e) => Err(e),
        };

        match retry {
            Ok(()) => {
                info!("resent after reconnect");
                Ok(SendOutcome::Sent)
            }
            Err(e) => {
                error!(error = %e, "connection lost");
                let _ = self.notify_tx.send(SessionEvent::ConnectionLost {
                    reason: e.to_string(),
                });
                Ok(SendOutcome::Disconnected)
            }
        }
    }
}

struct KeepAlive {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl KeepAlive {
    /// Aborts the task and waits for it, so a send or reconnect it had in
    /// flight is gone before the caller touches the transport.
    async fn stop(mut self) {
        self.cancel.cancel();
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// A single logical connection to the equalizer server.
pub struct Session {
    shared: Arc<Shared>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    notify_rx: mpsc::UnboundedReceiver<SessionEvent>,
    keep_alive: Option<KeepAlive>,
}

impl Session {
    pub fn new(transport: TransportConfig, config: SessionConfig) -> Self {
        let (transport, transport_rx) = Transport::channel(transport);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                phase: Mutex::new(ConnectionPhase::default()),
                last_send: Mutex::new(None),
                notify_tx,
            }),
            transport_rx,
            notify_rx,
            keep_alive: None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.phase().is_connected()
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.shared.transport.endpoint()
    }

    /// Generation of the underlying socket.
    pub fn generation(&self) -> u64 {
        self.shared.transport.generation()
    }

    /// Connects to `endpoint`, closing any current connection first.
    ///
    /// On success a [`SessionEvent::Connected`] is queued and the
    /// keep-alive starts.
    pub async fn connect(&mut self, endpoint: Endpoint) -> Result<(), EqError> {
        if !self.phase().is_disconnected() {
            self.close().await;
        }
        lock(&self.shared.phase).begin_connect()?;

        let budget = self.shared.transport.config().connect_attempts;
        let shared = &self.shared;
        let result = shared
            .transport
            .connect_observed(&endpoint, |attempt| {
                let mut phase = lock(&shared.phase);
                phase.retry_connect(budget);
                debug!(attempt, %phase, "retrying connect");
            })
            .await;

        if let Err(e) = result {
            lock(&self.shared.phase).disconnect();
            warn!(%endpoint, error = %e, "connect failed");
            return Err(e);
        }

        lock(&self.shared.phase).complete_connect()?;
        *lock(&self.shared.last_send) = None;
        self.start_keep_alive();
        info!(%endpoint, "session connected");
        let _ = self.shared.notify_tx.send(SessionEvent::Connected(endpoint));
        Ok(())
    }

    /// Sends one message.
    ///
    /// Non-important messages are dropped with [`SendOutcome::Blocked`]
    /// when the previous send was less than `rate_limit` ago.
    pub async fn send(&self, data: &str, important: bool) -> Result<SendOutcome, EqError> {
        self.shared.send(data, important).await
    }

    /// Waits for the next event. Keep-alive traffic and events from
    /// superseded sockets are filtered out.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            let event = tokio::select! {
                biased;
                Some(event) = self.notify_rx.recv() => return Some(event),
                Some(event) = self.transport_rx.recv() => event,
                else => return None,
            };
            if let Some(event) = self.on_transport_event(event).await {
                return Some(event);
            }
        }
    }

    /// Closes the connection. Queues a single `Disconnected` if the session
    /// was not already closed.
    pub async fn close(&mut self) {
        self.teardown().await;
    }

    /// Closes on behalf of the UI, e.g. after it gave up on a lost link.
    pub async fn side_disconnect(&mut self) {
        info!("disconnect requested");
        self.close().await;
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Option<SessionEvent> {
        let current = self.shared.transport.generation();
        if event.generation() != current {
            debug!(
                stale = event.generation(),
                current, "dropping event from old socket"
            );
            return None;
        }

        match event {
            TransportEvent::MessageReceived { text, .. } => {
                if is_control_message(&text) {
                    trace!(text = %text, "control message");
                    None
                } else {
                    Some(SessionEvent::MessageReceived(text))
                }
            }
            TransportEvent::SocketClosed { .. } => {
                info!("server closed the session");
                self.teardown().await;
                None
            }
            TransportEvent::ReceiveFailed { reason, .. } => {
                error!(%reason, "session receive failed");
                self.teardown().await;
                None
            }
        }
    }

    /// The notification is queued before the socket is awaited, so a
    /// `recv` cancelled mid-teardown does not lose it.
    async fn teardown(&mut self) {
        if lock(&self.shared.phase).disconnect() {
            info!("session disconnected");
            let _ = self.shared.notify_tx.send(SessionEvent::Disconnected);
        }
        if let Some(keep_alive) = self.keep_alive.take() {
            keep_alive.stop().await;
        }
        self.shared.transport.close().await;
    }

    fn start_keep_alive(&mut self) {
        let shared = Arc::clone(&self.shared);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shared.config.keep_alive_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match shared.send(KEEP_ALIVE, false).await {
                    Ok(SendOutcome::Disconnected) => {
                        debug!("keep-alive stopped, link is down");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "keep-alive failed"),
                }
            }
        });

        self.keep_alive = Some(KeepAlive { cancel, task });
    }
}
