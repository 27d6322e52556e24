//! Configuration for the console client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use eqconnect_core::{DEFAULT_PORT, MAX_FRAME_SIZE, SessionConfig, TransportConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address and socket tuning.
    pub network: NetworkConfig,
    /// Keep-alive and rate limiting.
    pub session: SessionSettings,
    /// Where remembered settings live.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Server host. Empty means "use the last address".
    pub host: String,
    pub port: u16,
    /// Bound on a connect call and on each send attempt.
    pub timeout_ms: u64,
    pub connect_attempts: u32,
    pub send_attempts: u32,
    pub retry_backoff_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_frame_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub keep_alive_interval_ms: u64,
    /// Minimum spacing of slider updates.
    pub rate_limit_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON key/value file. Empty disables persistence.
    pub settings_file: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            timeout_ms: transport.timeout.as_millis() as u64,
            connect_attempts: transport.connect_attempts,
            send_attempts: transport.send_attempts,
            retry_backoff_ms: transport.retry_backoff.as_millis() as u64,
            reconnect_delay_ms: transport.reconnect_delay.as_millis() as u64,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            keep_alive_interval_ms: session.keep_alive_interval.as_millis() as u64,
            rate_limit_ms: session.rate_limit.as_millis() as u64,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings_file: "eqconnect-settings.json".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_millis(self.network.timeout_ms.max(1)),
            connect_attempts: self.network.connect_attempts.max(1),
            send_attempts: self.network.send_attempts.max(1),
            retry_backoff: Duration::from_millis(self.network.retry_backoff_ms),
            reconnect_delay: Duration::from_millis(self.network.reconnect_delay_ms),
            max_frame_size: self.network.max_frame_size,
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            keep_alive_interval: Duration::from_millis(self.session.keep_alive_interval_ms.max(1)),
            rate_limit: Duration::from_millis(self.session.rate_limit_ms),
        }
    }

    /// Settings file path, if persistence is enabled.
    pub fn settings_path(&self) -> Option<PathBuf> {
        let file = self.storage.settings_file.trim();
        (!file.is_empty()).then(|| PathBuf::from(file))
    }
}

// ── Tests ────────────────────────────────────────────────────────
