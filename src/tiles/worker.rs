//! Tile worker thread
//!
//! The worker multiplexes a refresh ticker with the command channel. Fetching,
//! rendering and delivery all happen on this thread, so a slow producer never
//! blocks the protocol side. The ticker holds at most one pending tick, which
//! means a cycle that overruns the interval skips the missed ticks.
//!
//! # Error state
//!
//! Every tile starts out assuming the producer is unavailable. A failed fetch
//! puts all tiles into the error state: each shows the placeholder image, and
//! a tile entering the state notifies its configuration surface and persists
//! the flag. The first successful fetch afterwards sends the inverse
//! notification (`show_ui`) before rendering.

use crate::config::{DisplayConfig, TileSettings};
use crate::error::{ServiceError, TileConfigError};
use crate::service::TelemetrySource;
use crate::tiles::binding::TileBinding;
use crate::tiles::{DeckHandle, DeckTransport, TileCommand, TileEvent, TileFrame, TileRenderer};
use crate::types::Snapshot;
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Message sent to a recovering tile's configuration surface
pub const SHOW_UI_MESSAGE: &str = "show_ui";

/// Tile worker settings
#[derive(Debug, Clone, PartialEq)]
pub struct TileWorkerOptions {
    pub refresh_interval: Duration,
    pub history_capacity: usize,
    pub unavailable_message: String,
    /// Image shown while the producer is unavailable
    pub placeholder: Option<Vec<u8>>,
}

impl TileWorkerOptions {
    pub fn from_display(display: &DisplayConfig, placeholder: Option<Vec<u8>>) -> Self {
        Self {
            refresh_interval: display.refresh_interval(),
            history_capacity: display.history_capacity,
            unavailable_message: display.unavailable_message.clone(),
            placeholder,
        }
    }
}

/// Owner of all tile bindings
pub struct TileWorker {
    options: TileWorkerOptions,
    source: Arc<dyn TelemetrySource>,
    renderer: Box<dyn TileRenderer>,
    transport: Box<dyn DeckTransport>,
    command_rx: Receiver<TileCommand>,
    bindings: BTreeMap<String, TileBinding>,
    /// Outcome of the last fetch, for logging transitions only
    producer_available: Option<bool>,
}

impl TileWorker {
    /// Create a worker and the handle that drives it, without starting a thread
    pub fn new(
        options: TileWorkerOptions,
        source: Arc<dyn TelemetrySource>,
        renderer: Box<dyn TileRenderer>,
        transport: Box<dyn DeckTransport>,
    ) -> (Self, DeckHandle) {
        let (worker, command_tx) = Self::with_channel(options, source, renderer, transport);
        (worker, DeckHandle::new(command_tx, None))
    }

    /// Start a worker on its own thread
    pub fn spawn(
        options: TileWorkerOptions,
        source: Arc<dyn TelemetrySource>,
        renderer: Box<dyn TileRenderer>,
        transport: Box<dyn DeckTransport>,
    ) -> std::io::Result<DeckHandle> {
        let (worker, command_tx) = Self::with_channel(options, source, renderer, transport);
        let handle = std::thread::Builder::new()
            .name("tile-worker".into())
            .spawn(move || worker.run())?;
        Ok(DeckHandle::new(command_tx, Some(handle)))
    }

    fn with_channel(
        options: TileWorkerOptions,
        source: Arc<dyn TelemetrySource>,
        renderer: Box<dyn TileRenderer>,
        transport: Box<dyn DeckTransport>,
    ) -> (Self, Sender<TileCommand>) {
        let (command_tx, command_rx) = unbounded();
        let worker = Self {
            options,
            source,
            renderer,
            transport,
            command_rx,
            bindings: BTreeMap::new(),
            producer_available: None,
        };
        (worker, command_tx)
    }

    /// Run until shutdown or until every handle is dropped
    pub fn run(mut self) {
        tracing::info!(interval = ?self.options.refresh_interval, "Tile worker started");
        let commands = self.command_rx.clone();
        let ticker = tick(self.options.refresh_interval);
        loop {
            select! {
                recv(commands) -> command => match command {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.refresh(),
            }
        }
        tracing::info!("Tile worker stopped");
    }

    pub fn binding(&self, context: &str) -> Option<&TileBinding> {
        self.bindings.get(context)
    }

    pub fn tile_count(&self) -> usize {
        self.bindings.len()
    }

    /// Apply one command; false means stop
    pub fn handle_command(&mut self, command: TileCommand) -> bool {
        match command {
            TileCommand::Show { context, settings } => {
                tracing::debug!(context = %context, "Tile shown");
                self.upsert(context, settings);
            }
            TileCommand::UpdateSettings { context, settings } => {
                tracing::debug!(context = %context, "Tile settings updated");
                self.upsert(context, settings);
            }
            TileCommand::Remove(context) => {
                if self.bindings.remove(&context).is_some() {
                    tracing::debug!(context = %context, "Tile removed");
                }
            }
            TileCommand::RequestCatalog(context) => self.send_catalog(&context),
            TileCommand::RefreshNow => self.refresh(),
            TileCommand::Shutdown => return false,
        }
        true
    }

    fn upsert(&mut self, context: String, settings: TileSettings) {
        match self.bindings.get_mut(&context) {
            Some(binding) => {
                if binding.apply_settings(settings) {
                    tracing::debug!(context = %context, "Target changed, history cleared");
                }
            }
            None => {
                let binding = TileBinding::new(context.clone(), settings, self.options.history_capacity);
                self.bindings.insert(context, binding);
            }
        }
    }

    /// One refresh cycle: a single fetch shared by every tile
    pub fn refresh(&mut self) {
        if self.bindings.is_empty() {
            return;
        }

        let snapshot = match self.source.snapshot() {
            Ok(snapshot) => {
                self.note_availability(None);
                Some(snapshot)
            }
            Err(e) => {
                self.note_availability(Some(&e));
                None
            }
        };

        let mut bindings = std::mem::take(&mut self.bindings);
        for binding in bindings.values_mut() {
            match &snapshot {
                Some(snapshot) => self.refresh_tile(binding, snapshot),
                None => self.show_unavailable(binding),
            }
        }
        self.bindings = bindings;
    }

    fn note_availability(&mut self, error: Option<&ServiceError>) {
        let available = error.is_none();
        if self.producer_available == Some(available) {
            return;
        }
        self.producer_available = Some(available);
        match error {
            None => tracing::info!("Telemetry available"),
            Some(e) => tracing::warn!("Telemetry unavailable: {}", e),
        }
    }

    fn show_unavailable(&mut self, binding: &mut TileBinding) {
        let context = binding.context().to_string();
        if binding.set_error_state(true) {
            let event = TileEvent::Status {
                error: true,
                message: self.options.unavailable_message.clone(),
            };
            self.notify(&context, &event);
            self.persist(&context, binding.settings());
        }

        match &self.options.placeholder {
            Some(image) => {
                if let Err(e) = self.transport.set_image(&context, image) {
                    tracing::warn!(context = %context, "{}", e);
                }
            }
            None => tracing::debug!(context = %context, "No placeholder image loaded"),
        }
    }

    fn refresh_tile(&mut self, binding: &mut TileBinding, snapshot: &Snapshot) {
        let context = binding.context().to_string();
        if binding.set_error_state(false) {
            let event = TileEvent::Status {
                error: false,
                message: SHOW_UI_MESSAGE.to_string(),
            };
            self.notify(&context, &event);
            self.persist(&context, binding.settings());
        }

        let sample = match binding.resolve(snapshot) {
            Ok(sample) => sample,
            Err(TileConfigError::Unconfigured) => {
                tracing::debug!(context = %context, "Tile has no reading selected");
                return;
            }
            Err(e) => {
                tracing::warn!(context = %context, "Skipping tile: {}", e);
                return;
            }
        };

        binding.record(sample.value);
        let frame = TileFrame {
            reading: sample.reading,
            label: &sample.label,
            history: binding.history(),
            settings: binding.settings(),
        };
        match self.renderer.render(&context, &frame) {
            Ok(image) => self.set_image(&context, &image),
            Err(e) => tracing::warn!(context = %context, "{}", e),
        }
    }

    fn send_catalog(&mut self, context: &str) {
        let sensors = match self.source.list_sensors() {
            Ok(sensors) => sensors,
            Err(e) => {
                tracing::warn!(context, "Cannot list sensors: {}", e);
                return;
            }
        };

        let selected = self
            .bindings
            .get(context)
            .and_then(|b| b.settings().sensor_uid.clone())
            .filter(|uid| !uid.is_empty());
        let readings = match selected {
            Some(uid) => self.source.readings_for_sensor(&uid).unwrap_or_else(|e| {
                tracing::debug!(context, sensor = %uid, "No readings for selected sensor: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        self.notify(context, &TileEvent::Catalog { sensors, readings });
    }

    fn set_image(&mut self, context: &str, image: &[u8]) {
        if let Err(e) = self.transport.set_image(context, image) {
            tracing::warn!(context, "{}", e);
        }
    }

    fn notify(&mut self, context: &str, event: &TileEvent) {
        if let Err(e) = self.transport.notify(context, event) {
            tracing::warn!(context, "{}", e);
        }
    }

    fn persist(&mut self, context: &str, settings: &TileSettings) {
        if let Err(e) = self.transport.persist_settings(context, settings) {
            tracing::warn!(context, "{}", e);
        }
    }
}
