//! Launching the telemetry worker
//!
//! [`ProcessLauncher`] starts the companion executable with piped stdio, hands
//! it the magic cookie, a fresh session token and the reader config through
//! the environment, forwards its stderr into our log, and waits for the
//! handshake.

use crate::config::{ReaderConfig, ServiceConfig};
use crate::error::SupervisionError;
use crate::service::connection::ServiceConnection;
use crate::service::protocol::{
    Handshake, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, READER_CONFIG_KEY, SESSION_TOKEN_KEY,
};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// File stem of the companion executable
pub const WORKER_EXECUTABLE: &str = "hwinfo-telemetry-service";

/// A running worker process
pub trait WorkerProcess: Send {
    /// OS process id
    fn id(&self) -> u32;

    /// Exit status description once the process has exited
    fn try_exited(&mut self) -> Option<String>;

    /// Terminate the process and reap it
    fn kill(&mut self);
}

impl WorkerProcess for Child {
    fn id(&self) -> u32 {
        Child::id(self)
    }

    fn try_exited(&mut self) -> Option<String> {
        match self.try_wait() {
            Ok(Some(status)) => Some(status.to_string()),
            Ok(None) => None,
            Err(e) => Some(format!("wait failed: {}", e)),
        }
    }

    fn kill(&mut self) {
        if let Err(e) = Child::kill(self) {
            tracing::debug!("Kill of worker {} failed: {}", Child::id(self), e);
        }
        let _ = self.wait();
    }
}

/// A worker that completed its handshake
pub struct LaunchedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub connection: ServiceConnection,
    pub handshake: Handshake,
}

/// Something that can start a worker
pub trait WorkerLauncher: Send {
    fn launch(&mut self) -> Result<LaunchedWorker, SupervisionError>;
}

/// Default location of the companion: next to the running executable
pub fn default_worker_path() -> Result<PathBuf, SupervisionError> {
    let exe = std::env::current_exe().map_err(SupervisionError::Spawn)?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!("{}{}", WORKER_EXECUTABLE, std::env::consts::EXE_SUFFIX)))
}

/// Launches the companion executable as a child process
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
    reader_config: String,
    handshake_timeout: Duration,
    call_timeout: Duration,
}

impl ProcessLauncher {
    /// Resolve the executable and prepare the launch environment
    pub fn new(service: &ServiceConfig, reader: &ReaderConfig) -> Result<Self, SupervisionError> {
        let executable = match &service.executable {
            Some(path) => path.clone(),
            None => default_worker_path()?,
        };
        if !executable.is_file() {
            return Err(SupervisionError::ExecutableNotFound(executable));
        }
        let reader_config = serde_json::to_string(reader)
            .map_err(|e| SupervisionError::Handshake(format!("reader config: {}", e)))?;

        Ok(Self {
            executable,
            reader_config,
            handshake_timeout: service.handshake_timeout(),
            call_timeout: service.call_timeout(),
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&mut self) -> Result<LaunchedWorker, SupervisionError> {
        let token = uuid::Uuid::new_v4().to_string();
        let mut child = Command::new(&self.executable)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env(SESSION_TOKEN_KEY, &token)
            .env(READER_CONFIG_KEY, &self.reader_config)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(SupervisionError::Spawn)?;
        let pid = child.id();
        tracing::debug!(pid, "Spawned {:?}", self.executable);

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            WorkerProcess::kill(&mut child);
            return Err(SupervisionError::Handshake(
                "worker stdio was not captured".to_string(),
            ));
        };

        if let Err(e) = forward_stderr(pid, stderr) {
            tracing::warn!("Could not forward worker logs: {}", e);
        }

        match ServiceConnection::establish(
            Box::new(stdout),
            Box::new(stdin),
            &token,
            self.handshake_timeout,
            self.call_timeout,
        ) {
            Ok((connection, handshake)) => {
                if handshake.pid != pid {
                    tracing::debug!(pid, reported = handshake.pid, "Worker reported a different pid");
                }
                Ok(LaunchedWorker {
                    process: Box::new(child),
                    connection,
                    handshake,
                })
            }
            Err(e) => {
                WorkerProcess::kill(&mut child);
                Err(e)
            }
        }
    }
}

/// Re-log each stderr line of the worker under the `telemetry_service` target
fn forward_stderr(pid: u32, stderr: impl std::io::Read + Send + 'static) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("telemetry-stderr-{}", pid))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => tracing::info!(target: "telemetry_service", pid, "{}", line),
                    Err(_) => break,
                }
            }
        })
        .map(|_| ())
}
