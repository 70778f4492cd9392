//! Collaborators for running without a control surface
//!
//! [`TextRenderer`] draws a tile as one line of text with a sparkline of its
//! history, and [`LogTransport`] writes every delivery to the log.

use crate::config::TileSettings;
use crate::error::{RenderError, TransportError};
use crate::tiles::{DeckTransport, TileEvent, TileFrame, TileRenderer};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Renders `"<reading label>: <value text> <sparkline>"` as UTF-8
#[derive(Debug, Clone, Default)]
pub struct TextRenderer;

impl TextRenderer {
    pub fn sparkline(values: impl Iterator<Item = f64>, range: Option<(f64, f64)>) -> String {
        let Some((lo, hi)) = range else {
            return String::new();
        };
        let span = hi - lo;
        values
            .map(|v| {
                if !v.is_finite() {
                    return ' ';
                }
                let level = if span > 0.0 {
                    ((v - lo) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize
                } else {
                    0
                };
                SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
            })
            .collect()
    }
}

impl TileRenderer for TextRenderer {
    fn render(&mut self, _context: &str, frame: &TileFrame<'_>) -> Result<Vec<u8>, RenderError> {
        let spark = Self::sparkline(frame.history.iter(), frame.history.range());
        Ok(format!("{}: {} {}", frame.reading.label, frame.label, spark).into_bytes())
    }
}

/// Logs images, events and settings instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl DeckTransport for LogTransport {
    fn set_image(&mut self, context: &str, image: &[u8]) -> Result<(), TransportError> {
        tracing::info!(context, "{}", String::from_utf8_lossy(image));
        Ok(())
    }

    fn notify(&mut self, context: &str, event: &TileEvent) -> Result<(), TransportError> {
        let json = serde_json::to_string(event).map_err(|e| TransportError(e.to_string()))?;
        tracing::info!(context, event = %json, "Tile event");
        Ok(())
    }

    fn persist_settings(&mut self, context: &str, settings: &TileSettings) -> Result<(), TransportError> {
        let json = serde_json::to_string(settings).map_err(|e| TransportError(e.to_string()))?;
        tracing::debug!(context, settings = %json, "Tile settings persisted");
        Ok(())
    }
}
