//! Tile orchestration
//!
//! The tile worker owns every active [`TileBinding`]. On each refresh it
//! fetches one snapshot from the telemetry service, resolves every tile's
//! reading, appends it to the tile's history, renders a frame and hands the
//! image to the transport.
//!
//! Callers never touch bindings directly; they send [`TileCommand`]s through
//! a [`DeckHandle`].
//!
//! ```text
//! protocol thread ──DeckHandle──> tile worker ──> TelemetrySource
//!                                      │
//!                                      ├──> TileRenderer
//!                                      └──> DeckTransport
//! ```

pub mod binding;
pub mod headless;
pub mod history;
pub mod worker;

pub use binding::{TileBinding, TileSample};
pub use headless::{LogTransport, TextRenderer};
pub use history::ValueHistory;
pub use worker::{TileWorker, TileWorkerOptions};

use crate::config::TileSettings;
use crate::error::{RenderError, TransportError};
use crate::types::{Reading, Sensor};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;

/// Message sent from the protocol side to the tile worker
#[derive(Debug, Clone, PartialEq)]
pub enum TileCommand {
    /// A tile appeared with the given settings
    Show {
        context: String,
        settings: TileSettings,
    },
    /// The configuration surface changed a tile's settings
    UpdateSettings {
        context: String,
        settings: TileSettings,
    },
    /// A tile disappeared
    Remove(String),
    /// Send the sensor catalog to a tile's configuration surface
    RequestCatalog(String),
    /// Run a refresh cycle now
    RefreshNow,
    /// Stop the worker
    Shutdown,
}

/// Payload delivered to a tile's configuration surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TileEvent {
    /// Error state changed
    Status { error: bool, message: String },
    /// Sensors to choose from, plus the readings of the selected sensor
    Catalog {
        sensors: Vec<Sensor>,
        readings: Vec<Reading>,
    },
}

/// Everything the renderer gets for one tile
#[derive(Debug, Clone, Copy)]
pub struct TileFrame<'a> {
    pub reading: &'a Reading,
    pub label: &'a str,
    pub history: &'a ValueHistory,
    pub settings: &'a TileSettings,
}

/// Turns a frame into image bytes
pub trait TileRenderer: Send {
    fn render(&mut self, context: &str, frame: &TileFrame<'_>) -> Result<Vec<u8>, RenderError>;
}

/// Delivery to the control surface
pub trait DeckTransport: Send {
    /// Show an image on a tile
    fn set_image(&mut self, context: &str, image: &[u8]) -> Result<(), TransportError>;

    /// Send an event to the tile's configuration surface
    fn notify(&mut self, context: &str, event: &TileEvent) -> Result<(), TransportError>;

    /// Store the tile's settings
    fn persist_settings(&mut self, context: &str, settings: &TileSettings) -> Result<(), TransportError>;
}

/// Handle used to drive a running tile worker
#[derive(Debug)]
pub struct DeckHandle {
    command_tx: Sender<TileCommand>,
    worker: Option<JoinHandle<()>>,
}

impl DeckHandle {
    pub(crate) fn new(command_tx: Sender<TileCommand>, worker: Option<JoinHandle<()>>) -> Self {
        Self { command_tx, worker }
    }

    /// Send a command; false once the worker is gone
    pub fn send_command(&self, command: TileCommand) -> bool {
        self.command_tx.send(command).is_ok()
    }

    pub fn show(&self, context: impl Into<String>, settings: TileSettings) {
        let _ = self.command_tx.send(TileCommand::Show {
            context: context.into(),
            settings,
        });
    }

    pub fn update_settings(&self, context: impl Into<String>, settings: TileSettings) {
        let _ = self.command_tx.send(TileCommand::UpdateSettings {
            context: context.into(),
            settings,
        });
    }

    pub fn remove(&self, context: impl Into<String>) {
        let _ = self.command_tx.send(TileCommand::Remove(context.into()));
    }

    pub fn request_catalog(&self, context: impl Into<String>) {
        let _ = self
            .command_tx
            .send(TileCommand::RequestCatalog(context.into()));
    }

    pub fn refresh_now(&self) {
        let _ = self.command_tx.send(TileCommand::RefreshNow);
    }

    /// Stop the worker and wait for it
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for DeckHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(TileCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Tile worker thread panicked");
            }
        }
    }
}
