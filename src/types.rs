//! Core data types for hwinfo-deck
//!
//! This module contains the decoded telemetry model shared by the reader in the
//! worker process, the RPC protocol, and the tile orchestrator.
//!
//! # Main Types
//!
//! - [`ReadingType`] - Semantic type of a reading (temperature, voltage, ...)
//! - [`Sensor`] - A sensor descriptor with its stable uid
//! - [`Reading`] - A single live value belonging to one sensor
//! - [`Snapshot`] - Every sensor and reading decoded from one region copy
//!
//! # Identity
//!
//! A sensor's uid is built from the producer's sensor id and instance, so it is
//! stable across snapshots as long as the producer's sensor topology does not
//! change. A reading is identified by its sensor uid plus its reading id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic type of a reading, as declared by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReadingType {
    /// Untyped reading (producer code 0): counters, flags, yes/no values
    #[default]
    Count,
    /// Temperature
    Temperature,
    /// Voltage
    Voltage,
    /// Fan speed
    Fan,
    /// Current
    Current,
    /// Power
    Power,
    /// Clock frequency
    Clock,
    /// Usage percentage
    Usage,
    /// Anything else (throughput, timings, ...)
    Other,
    /// A type code this crate does not know; kept so the reading still decodes
    Unknown(u32),
}

impl ReadingType {
    /// Map the producer's numeric type code
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => ReadingType::Count,
            1 => ReadingType::Temperature,
            2 => ReadingType::Voltage,
            3 => ReadingType::Fan,
            4 => ReadingType::Current,
            5 => ReadingType::Power,
            6 => ReadingType::Clock,
            7 => ReadingType::Usage,
            8 => ReadingType::Other,
            other => ReadingType::Unknown(other),
        }
    }

    /// The producer's numeric type code
    pub fn code(&self) -> u32 {
        match self {
            ReadingType::Count => 0,
            ReadingType::Temperature => 1,
            ReadingType::Voltage => 2,
            ReadingType::Fan => 3,
            ReadingType::Current => 4,
            ReadingType::Power => 5,
            ReadingType::Clock => 6,
            ReadingType::Usage => 7,
            ReadingType::Other => 8,
            ReadingType::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ReadingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingType::Count => write!(f, "count"),
            ReadingType::Temperature => write!(f, "temperature"),
            ReadingType::Voltage => write!(f, "voltage"),
            ReadingType::Fan => write!(f, "fan"),
            ReadingType::Current => write!(f, "current"),
            ReadingType::Power => write!(f, "power"),
            ReadingType::Clock => write!(f, "clock"),
            ReadingType::Usage => write!(f, "usage"),
            ReadingType::Other => write!(f, "other"),
            ReadingType::Unknown(code) => write!(f, "unknown ({})", code),
        }
    }
}

/// Build the stable uid for a sensor
pub fn sensor_uid(sensor_id: u32, instance: u32) -> String {
    format!("{}-{}", sensor_id, instance)
}

/// A sensor descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Stable unique identifier, see [`sensor_uid`]
    pub uid: String,
    /// Producer sensor id
    pub sensor_id: u32,
    /// Producer sensor instance
    pub instance: u32,
    /// Display name (user-assigned name if set, otherwise the original)
    pub name: String,
    /// Name as reported by the producer before any user renaming
    pub original_name: String,
}

/// A single live reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Uid of the sensor this reading belongs to
    pub sensor_uid: String,
    /// Reading id, unique within its sensor
    pub id: u32,
    /// Semantic type
    pub reading_type: ReadingType,
    /// Display label (user-assigned label if set, otherwise the original)
    pub label: String,
    /// Label as reported by the producer
    pub original_label: String,
    /// Unit label (e.g. "°C", "%", "RPM")
    pub unit: String,
    /// Current value
    pub value: f64,
    /// Minimum seen by the producer
    pub min: f64,
    /// Maximum seen by the producer
    pub max: f64,
    /// Average computed by the producer
    pub avg: f64,
}

/// One decoded, internally consistent copy of the producer's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Snapshot {
    /// Producer layout version
    pub version: u32,
    /// Producer layout revision
    pub revision: u32,
    /// When the producer last polled its sensors
    pub poll_time: Option<DateTime<Utc>>,
    /// All sensors, in producer order
    pub sensors: Vec<Sensor>,
    /// All readings, in producer order
    pub readings: Vec<Reading>,
}

impl Snapshot {
    /// Find a sensor by uid
    pub fn sensor(&self, uid: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.uid == uid)
    }

    /// All readings belonging to a sensor
    pub fn readings_for_sensor<'a>(&'a self, uid: &'a str) -> impl Iterator<Item = &'a Reading> {
        self.readings.iter().filter(move |r| r.sensor_uid == uid)
    }

    /// Find one reading by sensor uid and reading id
    pub fn reading(&self, sensor_uid: &str, reading_id: u32) -> Option<&Reading> {
        self.readings
            .iter()
            .find(|r| r.sensor_uid == sensor_uid && r.id == reading_id)
    }

    /// Total number of readings
    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }
}
