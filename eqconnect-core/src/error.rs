//! Domain-specific error types for the equalizer client.
//!
//! All fallible operations return `Result<T, EqError>`.
//! Expected outcomes (a rate-limited send, a dropped connection) are not
//! errors; they are reported through [`SendOutcome`] and session events.
//!
//! [`SendOutcome`]: crate::network::session::SendOutcome

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the equalizer client.
#[derive(Debug, Error)]
pub enum EqError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The host name could not be resolved to any address.
    #[error("hostname is invalid: {0}")]
    HostnameInvalid(String),

    /// A connect or send exceeded its deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Every connection attempt failed.
    #[error("connection not established after {attempts} attempt(s): {reason}")]
    ConnectionNotEstablished { attempts: u32, reason: String },

    /// Every write attempt for a frame failed.
    #[error("send failed after {attempts} attempt(s): {reason}")]
    SendFailed { attempts: u32, reason: String },

    /// A send was attempted while no socket is open.
    #[error("socket is not initialized")]
    NoSocket,

    /// The read loop hit an error it cannot recover from.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The server closed the connection.
    #[error("connection closed by remote host")]
    RemoteClosed,

    /// A connection state transition was not valid from the current phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// `reconnect` was called before any `connect`.
    #[error("no previous endpoint to reconnect to")]
    NoEndpoint,

    // ── Framing Errors ───────────────────────────────────────────
    /// A frame length exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame payload was not valid UTF-8.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// The TCP/IO layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A message did not have the `<type>:<rest>` shape.
    #[error("malformed message: {0:?}")]
    MalformedMessage(String),

    /// A numeric field could not be parsed.
    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// A filter index was outside the store.
    #[error("no filter at index {0}")]
    NoSuchFilter(usize),

    // ── Settings Errors ──────────────────────────────────────────
    /// The settings store could not be read or written.
    #[error("settings store error: {0}")]
    Store(String),
}

impl EqError {
    /// Returns `true` when trying the same operation again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HostnameInvalid(_) | Self::Timeout { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Returns `true` for failures that mean the link to the server is gone.
    ///
    /// The session answers these with a single reconnect.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::NoSocket
            | Self::RemoteClosed
            | Self::SendFailed { .. }
            | Self::ReceiveFailed(_)
            | Self::Timeout { op: "send", .. } => true,
            Self::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }

    /// Short human-readable status line for the UI.
    pub fn status_message(&self) -> &'static str {
        match self {
            Self::HostnameInvalid(_) => "Hostname is invalid",
            Self::Timeout { op: "connect", .. } | Self::ConnectionNotEstablished { .. } => {
                "Connection unable to be established"
            }
            Self::Timeout { .. } => "Operation timed out",
            Self::NoSocket | Self::NoEndpoint => "Not connected",
            Self::RemoteClosed => "Server closed the connection",
            Self::SendFailed { .. } | Self::ReceiveFailed(_) | Self::Io(_) => "Connection lost",
            _ => "Unexpected error",
        }
    }
}

/// I/O error kinds raised when the peer has gone away.
pub(crate) fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof
    )
}

impl From<serde_json::Error> for EqError {
    fn from(e: serde_json::Error) -> Self {
        EqError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = EqError::FrameTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = EqError::Timeout {
            op: "connect",
            after: Duration::from_millis(3000),
        };
        assert!(e.to_string().starts_with("connect timed out"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: EqError = io_err.into();
        assert!(matches!(e, EqError::Io(_)));
        assert!(e.is_disconnect());
        assert!(!e.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(EqError::HostnameInvalid("nope".into()).is_retryable());
        let refused: EqError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(refused.is_retryable());
        assert!(!EqError::NoSocket.is_retryable());
    }

    #[test]
    fn send_timeout_is_disconnect_but_connect_timeout_is_not() {
        let send = EqError::Timeout {
            op: "send",
            after: Duration::from_secs(3),
        };
        let connect = EqError::Timeout {
            op: "connect",
            after: Duration::from_secs(3),
        };
        assert!(send.is_disconnect());
        assert!(!connect.is_disconnect());
    }

    #[test]
    fn status_messages() {
        assert_eq!(
            EqError::HostnameInvalid("x".into()).status_message(),
            "Hostname is invalid"
        );
        assert_eq!(
            EqError::ConnectionNotEstablished {
                attempts: 3,
                reason: "refused".into()
            }
            .status_message(),
            "Connection unable to be established"
        );
    }
}
