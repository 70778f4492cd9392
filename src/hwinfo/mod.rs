//! HWiNFO shared-memory access
//!
//! This module reads the sensor data the HWiNFO producer publishes through a
//! named file mapping, guarded by a named mutex.
//!
//! # Architecture
//!
//! ```text
//! CrossProcessLock ──┐
//!                    ├── TelemetryReader::fetch_snapshot ── decode ──> Snapshot
//! SharedRegion ──────┘         (retry, scratch copy)
//! ```
//!
//! - [`layout`] - header and element layout constants
//! - [`cursor`] - bounds-checked byte reads
//! - [`decoder`] - two-phase decode of a copied region
//! - [`lock`] / [`region`] - the guard and region seams
//! - [`reader`] - guarded copy with bounded retry
//! - [`image`] - writer for producer-layout images (dumps, tests)
//!
//! On Windows the live producer objects are used; elsewhere only dump replay
//! is available.

pub mod cursor;
pub mod decoder;
pub mod image;
pub mod layout;
pub mod lock;
pub mod reader;
pub mod region;
#[cfg(windows)]
pub mod windows;

pub use decoder::{decode, required_length};
pub use lock::{CrossProcessLock, NoopLock, ScopedLock};
pub use reader::{RetryPolicy, TelemetryReader};
pub use region::{DumpFileRegion, InMemoryRegion, MappedView, SharedRegion, UnavailableRegion};

use crate::config::ReaderConfig;

/// Build the reader described by `config`
///
/// A configured dump file takes precedence over live shared memory.
pub fn producer_reader(config: &ReaderConfig) -> TelemetryReader {
    let policy = config.retry_policy();
    let (lock, region): (Box<dyn CrossProcessLock>, Box<dyn SharedRegion>) =
        match &config.dump_path {
            Some(path) => {
                tracing::info!("Replaying region dump from {:?}", path);
                (Box::new(NoopLock), Box::new(DumpFileRegion::new(path)))
            }
            None => live_objects(),
        };
    TelemetryReader::with_scratch_capacity(lock, region, policy, config.initial_buffer_bytes)
}

#[cfg(windows)]
fn live_objects() -> (Box<dyn CrossProcessLock>, Box<dyn SharedRegion>) {
    (
        Box::new(windows::NamedMutex::new(layout::MUTEX_NAME)),
        Box::new(windows::NamedFileMapping::new(layout::MAP_NAME)),
    )
}

#[cfg(not(windows))]
fn live_objects() -> (Box<dyn CrossProcessLock>, Box<dyn SharedRegion>) {
    tracing::warn!("Live shared memory is only available on Windows; configure reader.dump_path");
    (
        Box::new(NoopLock),
        Box::new(UnavailableRegion::new(format!(
            "{} is not available on this platform",
            layout::MAP_NAME
        ))),
    )
}
