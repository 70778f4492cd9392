//! Association of one tile with one reading

use crate::config::TileSettings;
use crate::error::TileConfigError;
use crate::format::format_value;
use crate::tiles::history::ValueHistory;
use crate::types::{Reading, Snapshot};

/// A reading resolved for one refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct TileSample<'a> {
    pub reading: &'a Reading,
    /// Reading value after the divisor
    pub value: f64,
    /// Formatted display text
    pub label: String,
}

/// One active tile: its settings plus the values it has shown
#[derive(Debug, Clone)]
pub struct TileBinding {
    context: String,
    settings: TileSettings,
    history: ValueHistory,
}

impl TileBinding {
    pub fn new(context: impl Into<String>, settings: TileSettings, history_capacity: usize) -> Self {
        Self {
            context: context.into(),
            settings,
            history: ValueHistory::new(history_capacity),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn settings(&self) -> &TileSettings {
        &self.settings
    }

    pub fn history(&self) -> &ValueHistory {
        &self.history
    }

    pub fn in_error_state(&self) -> bool {
        self.settings.in_error_state
    }

    /// Set the persisted error flag; returns whether it changed
    pub fn set_error_state(&mut self, in_error: bool) -> bool {
        let changed = self.settings.in_error_state != in_error;
        self.settings.in_error_state = in_error;
        changed
    }

    /// Replace the settings
    ///
    /// The history is cleared when the target reading or the divisor changes.
    /// Returns whether it was.
    pub fn apply_settings(&mut self, settings: TileSettings) -> bool {
        let reset = self.settings.target() != settings.target()
            || self.settings.divisor.as_deref().map(str::trim)
                != settings.divisor.as_deref().map(str::trim);
        if reset {
            self.history.clear();
        }
        self.settings = settings;
        reset
    }

    /// Look up the bound reading in a snapshot, apply the divisor and format it
    pub fn resolve<'a>(&self, snapshot: &'a Snapshot) -> Result<TileSample<'a>, TileConfigError> {
        let (sensor_uid, reading_id) = self.settings.target().ok_or(TileConfigError::Unconfigured)?;
        if snapshot.sensor(sensor_uid).is_none() {
            return Err(TileConfigError::MissingSensor(sensor_uid.to_string()));
        }
        let reading = snapshot
            .reading(sensor_uid, reading_id)
            .ok_or_else(|| TileConfigError::MissingReading {
                sensor_uid: sensor_uid.to_string(),
                reading_id,
            })?;

        let value = match self.settings.divisor()? {
            Some(divisor) => reading.value / divisor,
            None => reading.value,
        };
        let label = format_value(
            value,
            reading.reading_type,
            &reading.unit,
            self.settings.format_spec(),
        );
        Ok(TileSample {
            reading,
            value,
            label,
        })
    }

    pub fn record(&mut self, value: f64) {
        self.history.push(value);
    }
}
