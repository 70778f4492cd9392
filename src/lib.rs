//! # hwinfo-deck: HWiNFO sensor tiles for a control surface
//!
//! Bridges live sensor telemetry published by HWiNFO through shared memory to a
//! set of display tiles that poll it independently, while tolerating the
//! producer starting late, crashing, or being absent.
//!
//! ## Architecture
//!
//! - **hwinfo**: decodes the shared-memory record under the producer's named
//!   mutex, with bounded retry
//! - **service**: runs the reader in a supervised companion process and talks
//!   to it over line-delimited JSON on its stdio
//! - **tiles**: binds tiles to readings and re-renders them on a fixed tick
//! - **format**: turns a reading value into display text
//! - **Communication**: crossbeam channels between the worker threads
//!
//! ## Configuration
//!
//! Settings live in `hwinfo-deck.toml`, looked up in the platform data
//! directory under `dev.hwinfo-deck` unless a path is given:
//!
//! - **Linux**: `~/.local/share/dev.hwinfo-deck/`
//! - **macOS**: `~/Library/Application Support/dev.hwinfo-deck/`
//! - **Windows**: `%APPDATA%\dev.hwinfo-deck\`
//!
//! ## Example
//!
//! ```no_run
//! use hwinfo_deck::{
//!     config::DeckConfig,
//!     service::{ProcessLauncher, TelemetryServiceClient},
//!     tiles::{LogTransport, TextRenderer, TileWorker, TileWorkerOptions},
//! };
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = DeckConfig::default();
//!     let launcher = ProcessLauncher::new(&config.service, &config.reader)?;
//!     let client = TelemetryServiceClient::start(Box::new(launcher), &config.service)?;
//!
//!     let deck = TileWorker::spawn(
//!         TileWorkerOptions::from_display(&config.display, None),
//!         Arc::new(client),
//!         Box::new(TextRenderer),
//!         Box::new(LogTransport),
//!     )?;
//!     for tile in &config.tiles {
//!         deck.show(tile.context.clone(), tile.settings.clone());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod hwinfo;
pub mod logging;
pub mod service;
pub mod tiles;
pub mod types;

// Re-export commonly used types
pub use config::{DeckConfig, TileSettings};
pub use error::{DeckError, Result};
pub use service::{TelemetryServiceClient, TelemetrySource};
pub use tiles::{DeckHandle, TileWorker};
pub use types::{Reading, ReadingType, Sensor, Snapshot};
