//! Error handling for hwinfo-deck
//!
//! Each layer of the telemetry pipeline has its own error type so callers can
//! tell a protocol mismatch with the producer apart from a transient failure:
//!
//! - [`DecodeError`] - the region bytes do not match the producer layout
//! - [`FetchError`] - a guarded read of the shared region failed
//! - [`SupervisionError`] - the telemetry worker process could not be launched
//! - [`ServiceError`] - an RPC call to the worker failed
//! - [`TileConfigError`] - one tile's settings cannot be applied
//!
//! [`DeckError`] is the umbrella type for configuration and I/O paths, with a
//! [`Result`] alias and the [`ResultExt`] context helpers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Section of the producer record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Sensor descriptor array
    Sensors,
    /// Reading descriptor array
    Readings,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Sensors => write!(f, "sensor"),
            Section::Readings => write!(f, "reading"),
        }
    }
}

/// The region bytes could not be decoded
///
/// None of these are retried by the decoder; they indicate a layout or version
/// mismatch with the producer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Header magic does not match
    #[error("bad region signature 0x{found:08X}")]
    BadSignature { found: u32 },

    /// Declared length exceeds the bytes available
    #[error("region truncated: {needed} bytes declared, {available} available")]
    TruncatedRegion { needed: u64, available: usize },

    /// An element violates a layout invariant
    #[error("malformed {section} section: {reason}")]
    MalformedElement { section: Section, reason: String },
}

impl DecodeError {
    /// True when the producer has marked the region as no longer active
    pub fn is_producer_inactive(&self) -> bool {
        matches!(
            self,
            DecodeError::BadSignature { found } if *found == crate::hwinfo::layout::INACTIVE_SIGNATURE
        )
    }

    pub(crate) fn malformed(section: Section, reason: impl Into<String>) -> Self {
        DecodeError::MalformedElement {
            section,
            reason: reason.into(),
        }
    }
}

/// A guarded read of the shared region failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The cross-process lock was not obtained within the wait bound
    #[error("timed out after {timeout:?} waiting for the producer lock")]
    LockTimeout { timeout: Duration },

    /// The cross-process lock could not be opened or waited on
    #[error("producer lock unavailable: {0}")]
    LockFailure(String),

    /// The shared mapping could not be opened or mapped
    #[error("shared memory mapping failed: {0}")]
    MappingFailure(String),

    /// The region contents were rejected by the decoder
    #[error("decode failed: {0}")]
    DecodeFailure(#[from] DecodeError),

    /// Every attempt failed
    #[error("producer unavailable after {attempts} attempts: {last}")]
    ProducerUnavailable { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::ProducerUnavailable { .. })
    }
}

/// The telemetry worker process could not be brought up
#[derive(Error, Debug)]
pub enum SupervisionError {
    /// The companion executable does not exist
    #[error("telemetry service executable not found at {0}")]
    ExecutableNotFound(std::path::PathBuf),

    /// The process could not be spawned
    #[error("failed to spawn telemetry service: {0}")]
    Spawn(#[source] std::io::Error),

    /// The handshake line was missing or did not match
    #[error("telemetry service handshake failed: {0}")]
    Handshake(String),

    /// No handshake line arrived in time
    #[error("telemetry service did not complete the handshake within {0:?}")]
    HandshakeTimeout(Duration),
}

/// Category of an error reported by the worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// The producer could not be read within the retry budget
    ProducerUnavailable,
    /// The producer's region was read but rejected by the decoder
    DecodeFailure,
    /// The requested sensor is not in the current snapshot
    UnknownSensor,
    /// The request could not be understood
    BadRequest,
}

/// Error reply from the worker process
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&FetchError> for RemoteError {
    fn from(err: &FetchError) -> Self {
        let kind = match err {
            FetchError::DecodeFailure(_) => RemoteErrorKind::DecodeFailure,
            _ => RemoteErrorKind::ProducerUnavailable,
        };
        RemoteError::new(kind, err.to_string())
    }
}

/// An RPC call to the worker process failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The channel to the worker is down (not started, exited, or relaunching)
    #[error("telemetry service unavailable: {0}")]
    Unavailable(String),

    /// The worker did not answer in time
    #[error("telemetry service call timed out after {0:?}")]
    Timeout(Duration),

    /// The worker answered with an error
    #[error("telemetry service error: {0}")]
    Remote(#[from] RemoteError),

    /// The worker answered with something unexpected
    #[error("telemetry service protocol error: {0}")]
    Protocol(String),
}

impl ServiceError {
    /// True when the failure is the channel itself rather than the producer
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ServiceError::Unavailable(_) | ServiceError::Timeout(_))
    }
}

/// One tile's configuration cannot be applied this cycle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TileConfigError {
    /// No sensor has been selected yet
    #[error("tile has no sensor selected")]
    Unconfigured,

    /// The divisor is not a number
    #[error("invalid divisor {0:?}")]
    InvalidDivisor(String),

    /// The sensor is not in the current snapshot
    #[error("sensor {0} not found")]
    MissingSensor(String),

    /// The reading is not present on the sensor
    #[error("reading {reading_id} not found on sensor {sensor_uid}")]
    MissingReading { sensor_uid: String, reading_id: u32 },
}

/// The rendering collaborator failed to produce an image
#[derive(Error, Debug, Clone, PartialEq)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

/// The transport collaborator failed to deliver
#[derive(Error, Debug, Clone, PartialEq)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

/// Main error type for hwinfo-deck operations
#[derive(Error, Debug)]
pub enum DeckError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to worker supervision
    #[error("Supervision error: {0}")]
    Supervision(#[from] SupervisionError),

    /// Errors from a telemetry service call
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Errors from reading the producer region
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DeckError>,
    },
}

impl DeckError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DeckError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for DeckError {
    fn from(err: serde_json::Error) -> Self {
        DeckError::Serialization(err.to_string())
    }
}

/// Result type alias for hwinfo-deck operations
pub type Result<T> = std::result::Result<T, DeckError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<DeckError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
