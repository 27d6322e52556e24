//! Framed TCP transport to the equalizer server.
//!
//! One socket at a time. Connect, send and close are serialized behind a
//! single async gate. Every successful connect bumps a generation counter;
//! a read loop only reports events while its generation is current, so a
//! loop left over from an earlier socket goes quiet on its own.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{FrameCodec, MAX_FRAME_SIZE};
use crate::error::{EqError, is_disconnect_kind};

// ── Endpoint ─────────────────────────────────────────────────────

/// Host and port of the equalizer server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Configuration ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on a whole connect call and on each send attempt.
    pub timeout: Duration,
    pub connect_attempts: u32,
    pub send_attempts: u32,
    /// Pause between failed connect attempts.
    pub retry_backoff: Duration,
    /// Pause between closing and reopening in [`Transport::reconnect`].
    pub reconnect_delay: Duration,
    pub max_frame_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3000),
            connect_attempts: 3,
            send_attempts: 2,
            retry_backoff: Duration::from_millis(100),
            reconnect_delay: Duration::from_millis(500),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

// ── Events ───────────────────────────────────────────────────────

/// Output of the read loop, tagged with the socket generation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    MessageReceived { generation: u64, text: String },
    SocketClosed { generation: u64 },
    ReceiveFailed { generation: u64, reason: String },
}

impl TransportEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::MessageReceived { generation, .. }
            | Self::SocketClosed { generation }
            | Self::ReceiveFailed { generation, .. } => *generation,
        }
    }
}

// ── Transport ────────────────────────────────────────────────────

/// Why the read loop of a socket stopped, left for the next send to pick up.
pub(crate) type ReadEnd = Arc<std::sync::Mutex<Option<EqError>>>;

/// The open half of a connection.
struct Link {
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    cancel: CancellationToken,
    ended: ReadEnd,
    _reader: JoinHandle<()>,
    generation: u64,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct Transport {
    config: TransportConfig,
    link: Mutex<Option<Link>>,
    endpoint: std::sync::Mutex<Option<Endpoint>>,
    generation: Arc<AtomicU64>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport {
    pub fn new(config: TransportConfig, events_tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            config,
            link: Mutex::new(None),
            endpoint: std::sync::Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            events_tx,
        }
    }

    /// Creates a transport together with the receiver for its events.
    pub fn channel(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(config, tx), rx)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Generation of the current socket. Events tagged with any other
    /// value are stale.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The endpoint of the last connect call.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    pub async fn connect(&self, endpoint: &Endpoint) -> Result<(), EqError> {
        self.connect_observed(endpoint, |_| {}).await
    }

    /// Opens a socket to `endpoint`, replacing any existing one.
    ///
    /// Fast failures are retried up to `connect_attempts` times with
    /// `retry_backoff` in between; `on_retry` sees the number of the attempt
    /// about to start. The whole call is bounded by `timeout`.
    pub async fn connect_observed(
        &self,
        endpoint: &Endpoint,
        mut on_retry: impl FnMut(u32) + Send,
    ) -> Result<(), EqError> {
        let mut link = self.link.lock().await;
        if link.take().is_some() {
            debug!("dropping previous socket before connect");
        }
        *self
            .endpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(endpoint.clone());

        let deadline = Instant::now() + self.config.timeout;
        let attempts = self.config.connect_attempts.max(1);
        let mut attempt = 1;

        let stream = loop {
            let result = match timeout_at(deadline, open(endpoint)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%endpoint, attempt, "connect timed out");
                    return Err(EqError::Timeout {
                        op: "connect",
                        after: self.config.timeout,
                    });
                }
            };
            match result {
                Ok(stream) => break stream,
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(%endpoint, attempt, error = %e, "connect attempt failed, retrying");
                    attempt += 1;
                    on_retry(attempt);
                    if timeout_at(deadline, sleep(self.config.retry_backoff))
                        .await
                        .is_err()
                    {
                        return Err(EqError::Timeout {
                            op: "connect",
                            after: self.config.timeout,
                        });
                    }
                }
                Err(e @ EqError::HostnameInvalid(_)) => return Err(e),
                Err(e) => {
                    return Err(EqError::ConnectionNotEstablished {
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        };

        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let ended = ReadEnd::default();

        let reader = tokio::spawn(read_loop(
            read_half,
            FrameCodec::with_max_frame_size(self.config.max_frame_size),
            generation,
            Arc::clone(&self.generation),
            cancel.clone(),
            Arc::clone(&ended),
            self.events_tx.clone(),
        ));

        *link = Some(Link {
            writer: FramedWrite::new(
                write_half,
                FrameCodec::with_max_frame_size(self.config.max_frame_size),
            ),
            cancel,
            ended,
            _reader: reader,
            generation,
        });

        info!(%endpoint, generation, attempt, "connected");
        Ok(())
    }

    /// Writes one frame.
    ///
    /// Each attempt is bounded by `timeout`. A retry flushes the frame still
    /// buffered from the first attempt, so the server never sees it twice.
    /// Once the attempts are used up the socket is closed.
    ///
    /// If the read loop has already seen the server go away, the socket is
    /// closed without writing and the loop's reason is returned
    /// ([`EqError::RemoteClosed`] or [`EqError::ReceiveFailed`]).
    pub async fn send(&self, message: &str) -> Result<(), EqError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or(EqError::NoSocket)?;

        let ended = link
            .ended
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(e) = ended {
            self.generation.fetch_add(1, Ordering::SeqCst);
            guard.take();
            info!(error = %e, "socket already closed by peer");
            return Err(e);
        }

        let attempts = self.config.send_attempts.max(1);
        let mut timed_out = false;
        let mut reason = String::new();

        for attempt in 1..=attempts {
            let write = async {
                if attempt == 1 {
                    link.writer.send(message).await
                } else {
                    SinkExt::<&str>::flush(&mut link.writer).await
                }
            };
            match timeout(self.config.timeout, write).await {
                Ok(Ok(())) => {
                    trace!(generation = link.generation, text = %message, "sent");
                    return Ok(());
                }
                Ok(Err(e @ EqError::FrameTooLarge { .. })) => return Err(e),
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "send failed");
                    timed_out = false;
                    reason = e.to_string();
                }
                Err(_) => {
                    warn!(attempt, "send timed out");
                    timed_out = true;
                }
            }
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        guard.take();
        info!("socket closed after failed send");

        if timed_out {
            Err(EqError::Timeout {
                op: "send",
                after: self.config.timeout,
            })
        } else {
            Err(EqError::SendFailed { attempts, reason })
        }
    }

    /// Closes the socket. Safe to call repeatedly.
    pub async fn close(&self) {
        // Invalidate the read loop before it can report the shutdown.
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(link) = self.link.lock().await.take() {
            debug!(generation = link.generation, "socket closed");
        }
    }

    /// Closes, waits `reconnect_delay`, then connects to the last endpoint.
    pub async fn reconnect(&self) -> Result<(), EqError> {
        let endpoint = self.endpoint().ok_or(EqError::NoEndpoint)?;
        info!(%endpoint, "reconnecting");
        self.close().await;
        sleep(self.config.reconnect_delay).await;
        self.connect(&endpoint).await
    }
}

async fn open(endpoint: &Endpoint) -> Result<TcpStream, EqError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((endpoint.host(), endpoint.port()))
        .await
        .map_err(|e| EqError::HostnameInvalid(format!("{}: {e}", endpoint.host())))?
        .collect();
    if addrs.is_empty() {
        return Err(EqError::HostnameInvalid(endpoint.host().to_string()));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "address refused connection");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.map_or(EqError::NoSocket, EqError::Io))
}

// ── Read loop ────────────────────────────────────────────────────

/// Pulls frames off `reader` until the peer closes, an error occurs, the
/// token is cancelled or `current` moves past `generation`. A close or
/// failure is recorded in `ended` as well as reported on `events`.
pub(crate) async fn read_loop<R>(
    reader: R,
    codec: FrameCodec,
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
    ended: ReadEnd,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, codec);
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(generation, "read loop cancelled");
                return;
            }
            next = frames.next() => next,
        };

        if current.load(Ordering::SeqCst) != generation {
            debug!(generation, "read loop superseded");
            return;
        }

        let (event, end) = match next {
            Some(Ok(text)) => {
                trace!(generation, text = %text, "frame received");
                (TransportEvent::MessageReceived { generation, text }, None)
            }
            None => {
                info!(generation, "server closed the connection");
                (
                    TransportEvent::SocketClosed { generation },
                    Some(EqError::RemoteClosed),
                )
            }
            Some(Err(EqError::Io(e))) if is_disconnect_kind(e.kind()) => {
                info!(generation, error = %e, "connection dropped");
                (
                    TransportEvent::SocketClosed { generation },
                    Some(EqError::RemoteClosed),
                )
            }
            Some(Err(e)) => {
                warn!(generation, error = %e, "receive failed");
                let reason = e.to_string();
                (
                    TransportEvent::ReceiveFailed {
                        generation,
                        reason: reason.clone(),
                    },
                    Some(EqError::ReceiveFailed(reason)),
                )
            }
        };

        let last = end.is_some();
        if let Some(end) = end {
            *ended.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(end);
        }
        if events.send(event).is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn frame(text: &str) -> Vec<u8> {
        let mut out = (text.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    async fn run(
        reader: tokio_test::io::Mock,
        generation: u64,
        current: u64,
    ) -> (Vec<TransportEvent>, Option<EqError>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ended = ReadEnd::default();
        read_loop(
            reader,
            FrameCodec::new(),
            generation,
            Arc::new(AtomicU64::new(current)),
            CancellationToken::new(),
            Arc::clone(&ended),
            tx,
        )
        .await;
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        let end = ended.lock().unwrap().take();
        (out, end)
    }

    async fn collect(
        reader: tokio_test::io::Mock,
        generation: u64,
        current: u64,
    ) -> Vec<TransportEvent> {
        run(reader, generation, current).await.0
    }

    #[tokio::test]
    async fn read_loop_emits_messages_then_closed() {
        let mock = Builder::new()
            .read(&frame("volume:2"))
            .read(&frame("playback:play"))
            .build();

        let events = collect(mock, 1, 1).await;
        assert_eq!(
            events,
            vec![
                TransportEvent::MessageReceived {
                    generation: 1,
                    text: "volume:2".into()
                },
                TransportEvent::MessageReceived {
                    generation: 1,
                    text: "playback:play".into()
                },
                TransportEvent::SocketClosed { generation: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn read_loop_reassembles_split_frames() {
        let bytes = frame("filters:1,2,3");
        let mock = Builder::new().read(&bytes[..3]).read(&bytes[3..]).build();

        let events = collect(mock, 4, 4).await;
        assert_eq!(
            events[0],
            TransportEvent::MessageReceived {
                generation: 4,
                text: "filters:1,2,3".into()
            }
        );
    }

    #[tokio::test]
    async fn read_loop_reports_reset_as_closed() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let events = collect(mock, 2, 2).await;
        assert_eq!(events, vec![TransportEvent::SocketClosed { generation: 2 }]);
    }

    #[tokio::test]
    async fn read_loop_reports_other_errors_as_receive_failed() {
        let mock = Builder::new().read(&[0, 0, 0, 2, 0xff, 0xfe]).build();

        let events = collect(mock, 3, 3).await;
        assert!(matches!(
            events.as_slice(),
            [TransportEvent::ReceiveFailed { generation: 3, .. }]
        ));
    }

    #[tokio::test]
    async fn stale_read_loop_stays_silent() {
        let mock = Builder::new().read(&frame("volume:2")).build();

        let (events, end) = run(mock, 1, 2).await;
        assert!(events.is_empty());
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn read_loop_records_why_it_ended() {
        let closed = Builder::new().read(&frame("volume:2")).build();
        let (_, end) = run(closed, 1, 1).await;
        assert!(matches!(end, Some(EqError::RemoteClosed)));

        let garbled = Builder::new().read(&[0, 0, 0, 2, 0xff, 0xfe]).build();
        let (_, end) = run(garbled, 1, 1).await;
        let end = end.unwrap();
        assert!(matches!(end, EqError::ReceiveFailed(_)));
        assert!(end.is_disconnect());
    }

    #[tokio::test]
    async fn send_without_socket_fails() {
        let (transport, _rx) = Transport::channel(TransportConfig::default());
        assert!(matches!(
            transport.send("volume:1").await,
            Err(EqError::NoSocket)
        ));
        assert!(!transport.is_connected().await);
    }

    #[tokio::test]
    async fn reconnect_without_endpoint_fails() {
        let (transport, _rx) = Transport::channel(TransportConfig::default());
        assert!(matches!(
            transport.reconnect().await,
            Err(EqError::NoEndpoint)
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_bumps_generation() {
        let (transport, _rx) = Transport::channel(TransportConfig::default());
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.generation(), 2);
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::new("10.0.0.2", 2048).to_string(), "10.0.0.2:2048");
    }
}
