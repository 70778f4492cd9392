//! Telemetry service
//!
//! HWiNFO's shared memory is read by a separate companion process. The deck
//! process talks to it over line-delimited JSON on the child's stdio:
//!
//! - [`protocol`]: handshake and request/response messages
//! - [`server`]: the companion's request loop
//! - [`connection`]: the deck side of one worker's channel
//! - [`launcher`]: starting the companion executable
//! - [`supervisor`]: liveness checks, relaunch and shutdown
//! - [`pipe`]: an in-process stdio stand-in for running a worker on a thread

pub mod connection;
pub mod launcher;
pub mod pipe;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use connection::ServiceConnection;
pub use launcher::{LaunchedWorker, ProcessLauncher, WorkerLauncher, WorkerProcess};
pub use server::{serve, ServeOutcome, SnapshotSource};
pub use supervisor::{ServiceEvent, ServiceState, TelemetryServiceClient};

use crate::error::ServiceError;
use crate::types::{Reading, Sensor, Snapshot};

/// Query surface of the telemetry service as seen by consumers
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySource: Send + Sync {
    /// Full snapshot of sensors and readings
    fn snapshot(&self) -> Result<Snapshot, ServiceError>;

    /// All sensors currently exposed by the producer
    fn list_sensors(&self) -> Result<Vec<Sensor>, ServiceError>;

    /// Readings belonging to one sensor
    fn readings_for_sensor(&self, sensor_uid: &str) -> Result<Vec<Reading>, ServiceError>;
}
