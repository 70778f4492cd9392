//! Telemetry service client and supervisor
//!
//! [`TelemetryServiceClient`] owns the worker process through a supervisor
//! thread. The thread checks liveness on a fixed tick and relaunches the worker
//! as soon as it finds it gone, in the same tick. It is the only writer of the
//! shared state slot; callers only read it.
//!
//! ```text
//! NotStarted ──> Starting ──> Connected ──> Exited ──> Starting ──> ...
//! ```
//!
//! Calls made while the worker is not `Connected` fail immediately with
//! [`ServiceError::Unavailable`]; nothing blocks waiting for a relaunch.

use crate::config::ServiceConfig;
use crate::error::{ServiceError, SupervisionError};
use crate::service::connection::ServiceConnection;
use crate::service::launcher::{LaunchedWorker, WorkerLauncher, WorkerProcess};
use crate::service::TelemetrySource;
use crate::types::{Reading, Sensor, Snapshot};
use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Capacity of the event channel; events beyond it are dropped
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotStarted,
    Starting,
    Connected,
    Exited,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::NotStarted => write!(f, "not started"),
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Connected => write!(f, "connected"),
            ServiceState::Exited => write!(f, "exited"),
        }
    }
}

/// Published by the supervisor on every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    /// The state slot changed
    StateChanged(ServiceState),
    /// A worker completed its handshake
    Started { pid: u32, restarts: u32 },
    /// The worker exited or its channel broke
    Exited { pid: u32, status: String },
    /// A relaunch attempt failed; the next tick retries
    RelaunchFailed(String),
}

#[derive(Debug)]
struct Slot {
    state: ServiceState,
    connection: Option<Arc<ServiceConnection>>,
    pid: Option<u32>,
    restarts: u32,
}

/// Handle to the supervised telemetry worker
pub struct TelemetryServiceClient {
    slot: Arc<Mutex<Slot>>,
    events_rx: Receiver<ServiceEvent>,
    shutdown_tx: Option<Sender<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl TelemetryServiceClient {
    /// Launch the worker and start supervising it
    ///
    /// Failure to bring up the first worker is returned to the caller.
    pub fn start(
        mut launcher: Box<dyn WorkerLauncher>,
        config: &ServiceConfig,
    ) -> Result<Self, SupervisionError> {
        let (events_tx, events_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let slot = Arc::new(Mutex::new(Slot {
            state: ServiceState::NotStarted,
            connection: None,
            pid: None,
            restarts: 0,
        }));

        let mut supervisor = Supervisor {
            slot: Arc::clone(&slot),
            events_tx,
            process: None,
            interval: config.liveness_interval(),
            shutdown_grace: config.shutdown_grace(),
        };
        supervisor.set_state(ServiceState::Starting);
        let worker = launcher.launch().map_err(|e| {
            supervisor.set_state(ServiceState::Exited);
            e
        })?;
        supervisor.install(worker, false);

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let handle = std::thread::Builder::new()
            .name("telemetry-supervisor".into())
            .spawn(move || supervisor.run(launcher, shutdown_rx))
            .map_err(SupervisionError::Spawn)?;

        Ok(Self {
            slot,
            events_rx,
            shutdown_tx: Some(shutdown_tx),
            supervisor: Some(handle),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        self.slot
            .lock()
            .map(|slot| slot.state)
            .unwrap_or(ServiceState::Exited)
    }

    /// Pid of the current worker, if one is running
    pub fn worker_pid(&self) -> Option<u32> {
        self.slot.lock().ok().and_then(|slot| slot.pid)
    }

    /// Number of relaunches since start
    pub fn restarts(&self) -> u32 {
        self.slot.lock().map(|slot| slot.restarts).unwrap_or(0)
    }

    /// Receiver of supervisor events
    pub fn events(&self) -> Receiver<ServiceEvent> {
        self.events_rx.clone()
    }

    fn connection(&self) -> Result<Arc<ServiceConnection>, ServiceError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| ServiceError::Unavailable("state slot poisoned".to_string()))?;
        match (&slot.state, &slot.connection) {
            (ServiceState::Connected, Some(connection)) => Ok(Arc::clone(connection)),
            (state, _) => Err(ServiceError::Unavailable(format!("telemetry service is {}", state))),
        }
    }

    pub fn list_sensors(&self) -> Result<Vec<Sensor>, ServiceError> {
        self.connection()?.list_sensors()
    }

    pub fn readings_for_sensor(&self, sensor_uid: &str) -> Result<Vec<Reading>, ServiceError> {
        self.connection()?.readings_for_sensor(sensor_uid)
    }

    pub fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        self.connection()?.snapshot()
    }
}

impl TelemetrySource for TelemetryServiceClient {
    fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        TelemetryServiceClient::snapshot(self)
    }

    fn list_sensors(&self) -> Result<Vec<Sensor>, ServiceError> {
        TelemetryServiceClient::list_sensors(self)
    }

    fn readings_for_sensor(&self, sensor_uid: &str) -> Result<Vec<Reading>, ServiceError> {
        TelemetryServiceClient::readings_for_sensor(self, sensor_uid)
    }
}

impl Drop for TelemetryServiceClient {
    fn drop(&mut self) {
        // Closing the channel wakes the supervisor
        drop(self.shutdown_tx.take());
        if let Some(handle) = self.supervisor.take() {
            if handle.join().is_err() {
                tracing::error!("Telemetry supervisor thread panicked");
            }
        }
    }
}

/// State owned by the supervisor thread
struct Supervisor {
    slot: Arc<Mutex<Slot>>,
    events_tx: Sender<ServiceEvent>,
    process: Option<Box<dyn WorkerProcess>>,
    interval: Duration,
    shutdown_grace: Duration,
}

impl Supervisor {
    fn run(mut self, mut launcher: Box<dyn WorkerLauncher>, shutdown_rx: Receiver<()>) {
        tracing::debug!(interval = ?self.interval, "Telemetry supervisor started");
        let ticker = tick(self.interval);
        loop {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(ticker) -> _ => self.check(launcher.as_mut()),
            }
        }
        self.shutdown();
        tracing::debug!("Telemetry supervisor stopped");
    }

    fn publish(&self, event: ServiceEvent) {
        // Nobody listening, or listener too slow: events are advisory
        let _ = self.events_tx.try_send(event);
    }

    fn set_state(&mut self, state: ServiceState) {
        let changed = match self.slot.lock() {
            Ok(mut slot) => {
                let changed = slot.state != state;
                slot.state = state;
                if state != ServiceState::Connected {
                    slot.connection = None;
                    slot.pid = None;
                }
                changed
            }
            Err(_) => false,
        };
        if changed {
            self.publish(ServiceEvent::StateChanged(state));
        }
    }

    fn install(&mut self, worker: LaunchedWorker, relaunch: bool) {
        let pid = worker.process.id();
        let restarts = match self.slot.lock() {
            Ok(mut slot) => {
                if relaunch {
                    slot.restarts += 1;
                }
                slot.connection = Some(Arc::new(worker.connection));
                slot.pid = Some(pid);
                slot.restarts
            }
            Err(_) => 0,
        };
        self.process = Some(worker.process);
        tracing::info!(pid, restarts, "Telemetry service connected");
        self.set_state(ServiceState::Connected);
        self.publish(ServiceEvent::Started { pid, restarts });
    }

    fn current_connection(&self) -> Option<Arc<ServiceConnection>> {
        self.slot.lock().ok().and_then(|slot| slot.connection.clone())
    }

    /// One liveness check; relaunches right away if the worker is gone
    fn check(&mut self, launcher: &mut dyn WorkerLauncher) {
        let broken = self.current_connection().map_or(true, |c| c.is_broken());
        if let Some(process) = self.process.as_mut() {
            let pid = process.id();
            let status = match process.try_exited() {
                Some(status) => Some(status),
                None if broken => {
                    tracing::warn!(pid, "Telemetry service channel broken, killing worker");
                    process.kill();
                    Some("channel broken".to_string())
                }
                None => None,
            };
            match status {
                None => return,
                Some(status) => {
                    tracing::warn!(pid, %status, "Telemetry service exited, restarting");
                    self.process = None;
                    self.set_state(ServiceState::Exited);
                    self.publish(ServiceEvent::Exited { pid, status });
                }
            }
        }

        self.set_state(ServiceState::Starting);
        match launcher.launch() {
            Ok(worker) => self.install(worker, true),
            Err(e) => {
                tracing::error!("Failed to restart telemetry service: {}", e);
                self.set_state(ServiceState::Exited);
                self.publish(ServiceEvent::RelaunchFailed(e.to_string()));
            }
        }
    }

    fn shutdown(&mut self) {
        let connection = self.current_connection();
        self.set_state(ServiceState::Exited);
        let Some(mut process) = self.process.take() else {
            return;
        };

        if let Some(connection) = connection {
            if let Err(e) = connection.shutdown() {
                tracing::debug!("Shutdown request failed: {}", e);
            }
        }
        let deadline = Instant::now() + self.shutdown_grace;
        while Instant::now() < deadline {
            if process.try_exited().is_some() {
                tracing::debug!("Telemetry service exited cleanly");
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        tracing::debug!("Telemetry service did not exit in time, killing");
        process.kill();
    }
}
