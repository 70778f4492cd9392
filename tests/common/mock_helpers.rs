//! Fake collaborators: an in-process worker launcher and a recording transport

use hwinfo_deck::config::TileSettings;
use hwinfo_deck::error::{RenderError, SupervisionError, TransportError};
use hwinfo_deck::hwinfo::{InMemoryRegion, NoopLock, RetryPolicy, TelemetryReader};
use hwinfo_deck::service::pipe::pipe;
use hwinfo_deck::service::server::{send_handshake, serve};
use hwinfo_deck::service::{LaunchedWorker, ServiceConnection, WorkerLauncher, WorkerProcess};
use hwinfo_deck::tiles::{DeckTransport, TileEvent, TileFrame, TileRenderer};
use std::io::BufReader;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Retry policy that gives up quickly
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        retry_delay: Duration::from_millis(1),
        lock_timeout: Duration::from_millis(10),
    }
}

/// A worker running the real request loop on a thread
pub struct ThreadProcess {
    pid: u32,
    exited: Arc<AtomicBool>,
}

impl WorkerProcess for ThreadProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn try_exited(&mut self) -> Option<String> {
        self.exited.load(Ordering::SeqCst).then(|| "exited".to_string())
    }

    fn kill(&mut self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

/// Launches workers that read from a shared in-memory region
///
/// Each worker serves over an in-process pipe, so the whole
/// supervisor/connection/server stack runs without spawning processes.
#[derive(Clone)]
pub struct InProcessLauncher {
    pub region: InMemoryRegion,
    pub launches: Arc<AtomicU32>,
    /// Exit flags of every launched worker, in launch order
    pub workers: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    /// Launches beyond this number fail
    pub max_launches: Option<u32>,
}

impl InProcessLauncher {
    pub fn new(region: InMemoryRegion) -> Self {
        Self {
            region,
            launches: Arc::new(AtomicU32::new(0)),
            workers: Arc::new(Mutex::new(Vec::new())),
            max_launches: None,
        }
    }

    /// Simulate the newest worker dying
    pub fn crash_latest(&self) {
        if let Some(flag) = self.workers.lock().unwrap().last() {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn launch_count(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }
}

impl WorkerLauncher for InProcessLauncher {
    fn launch(&mut self) -> Result<LaunchedWorker, SupervisionError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_launches.is_some_and(|max| n > max) {
            return Err(SupervisionError::Handshake("launch refused".into()));
        }

        let (request_writer, request_reader) = pipe();
        let (mut reply_writer, reply_reader) = pipe();
        let exited = Arc::new(AtomicBool::new(false));
        self.workers.lock().unwrap().push(exited.clone());

        let token = format!("token-{}", n);
        let mut reader = TelemetryReader::new(
            Box::new(NoopLock),
            Box::new(self.region.clone()),
            fast_policy(),
        );
        send_handshake(&mut reply_writer, &token).map_err(SupervisionError::Spawn)?;
        let done = exited.clone();
        std::thread::spawn(move || {
            let _ = serve(&mut reader, BufReader::new(request_reader), reply_writer);
            done.store(true, Ordering::SeqCst);
        });

        let (connection, handshake) = ServiceConnection::establish(
            Box::new(reply_reader),
            Box::new(request_writer),
            &token,
            Duration::from_secs(2),
            Duration::from_secs(2),
        )?;
        Ok(LaunchedWorker {
            process: Box::new(ThreadProcess {
                pid: 10_000 + n,
                exited,
            }),
            connection,
            handshake,
        })
    }
}

/// Everything a transport was asked to deliver
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Image(String, String),
    Event(String, TileEvent),
    Settings(String, TileSettings),
}

/// Transport that records deliveries for inspection
#[derive(Clone, Default)]
pub struct RecordingTransport {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock().unwrap())
    }

    pub fn snapshot(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl DeckTransport for RecordingTransport {
    fn set_image(&mut self, context: &str, image: &[u8]) -> Result<(), TransportError> {
        self.deliveries.lock().unwrap().push(Delivery::Image(
            context.to_string(),
            String::from_utf8_lossy(image).into_owned(),
        ));
        Ok(())
    }

    fn notify(&mut self, context: &str, event: &TileEvent) -> Result<(), TransportError> {
        self.deliveries
            .lock()
            .unwrap()
            .push(Delivery::Event(context.to_string(), event.clone()));
        Ok(())
    }

    fn persist_settings(&mut self, context: &str, settings: &TileSettings) -> Result<(), TransportError> {
        self.deliveries
            .lock()
            .unwrap()
            .push(Delivery::Settings(context.to_string(), settings.clone()));
        Ok(())
    }
}

/// Renders just the formatted label
pub struct LabelRenderer;

impl TileRenderer for LabelRenderer {
    fn render(&mut self, _context: &str, frame: &TileFrame<'_>) -> Result<Vec<u8>, RenderError> {
        Ok(frame.label.as_bytes().to_vec())
    }
}
