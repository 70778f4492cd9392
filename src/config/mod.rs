//! Configuration module for hwinfo-deck
//!
//! This module handles the runner configuration file and per-tile settings:
//! - [`DeckConfig`] - TOML file with reader, service, display and logging sections
//! - [`TileSettings`] - JSON settings object owned by the configuration surface
//!
//! # Config Location
//!
//! The runner takes an explicit path as its first argument. Without one it
//! looks for `hwinfo-deck.toml` in the platform data directory:
//! - **Linux**: `~/.local/share/dev.hwinfo-deck/`
//! - **macOS**: `~/Library/Application Support/dev.hwinfo-deck/`
//! - **Windows**: `%APPDATA%\dev.hwinfo-deck\`
//!
//! # Example
//!
//! ```toml
//! [reader]
//! max_attempts = 5
//! retry_delay_ms = 1000
//!
//! [display]
//! refresh_interval_ms = 1000
//!
//! [[tiles]]
//! context = "cpu-temp"
//! settings = { sensorUid = "4026532096-0", readingId = "1", format = "%.1f" }
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{DeckError, Result};
use crate::hwinfo::reader::{RetryPolicy, DEFAULT_SCRATCH_BYTES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hwinfo-deck";

/// Config filename
pub const CONFIG_FILE: &str = "hwinfo-deck.toml";

/// Default liveness polling interval in milliseconds
pub const DEFAULT_LIVENESS_INTERVAL_MS: u64 = 1000;

/// Default refresh interval in milliseconds
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Default number of values kept per tile
pub const DEFAULT_HISTORY_CAPACITY: usize = 72;

// ==================== Config Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Reader Config ====================

/// Shared-memory reader settings
///
/// Passed to the telemetry worker process as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Attempts per fetch before the producer is reported unavailable
    pub max_attempts: u32,

    /// Pause between failed attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Bound on each wait for the producer's lock in milliseconds
    pub lock_timeout_ms: u64,

    /// Initial scratch buffer size in bytes
    pub initial_buffer_bytes: usize,

    /// Read a captured region image from this file instead of live shared memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_path: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            retry_delay_ms: policy.retry_delay.as_millis() as u64,
            lock_timeout_ms: policy.lock_timeout.as_millis() as u64,
            initial_buffer_bytes: DEFAULT_SCRATCH_BYTES,
            dump_path: None,
        }
    }
}

impl ReaderConfig {
    /// Retry policy described by this config
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }
}

// ==================== Service Config ====================

/// Telemetry worker supervision settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Worker executable; defaults to the companion next to the current binary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,

    /// How often worker liveness is checked, in milliseconds
    pub liveness_interval_ms: u64,

    /// How long to wait for the worker's handshake, in milliseconds
    pub handshake_timeout_ms: u64,

    /// How long to wait for a reply to one call, in milliseconds
    pub call_timeout_ms: u64,

    /// Time given to the worker to exit after a shutdown request, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            executable: None,
            liveness_interval_ms: DEFAULT_LIVENESS_INTERVAL_MS,
            handshake_timeout_ms: 5000,
            call_timeout_ms: 10_000,
            shutdown_grace_ms: 500,
        }
    }
}

impl ServiceConfig {
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ==================== Display Config ====================

/// Tile refresh and rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Refresh cycle period in milliseconds
    pub refresh_interval_ms: u64,

    /// Values kept per tile for the graph
    pub history_capacity: usize,

    /// Image shown while the producer is unavailable
    pub placeholder_image: PathBuf,

    /// Message sent to the configuration surface on entering the error state
    pub unavailable_message: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            placeholder_image: PathBuf::from("launch-hwinfo.png"),
            unavailable_message: "HWiNFO Unavailable".to_string(),
        }
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

// ==================== Logging Config ====================

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Log file written next to the executable; `None` logs to stderr only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file_name: Some("hwinfo.log".to_string()),
        }
    }
}

// ==================== Deck Config ====================

/// A tile bound at startup by the headless runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntry {
    /// Opaque tile identifier
    pub context: String,

    /// Tile settings
    #[serde(default)]
    pub settings: TileSettings,
}

/// Complete runner configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckConfig {
    pub reader: ReaderConfig,
    pub service: ServiceConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
    pub tiles: Vec<TileEntry>,
}

impl DeckConfig {
    /// Load a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeckError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            DeckError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load a config file, returning defaults on any error
    ///
    /// A missing file is not worth a warning; a broken one is.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeckError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DeckError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            DeckError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}
