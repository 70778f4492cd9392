//! Per-tile settings
//!
//! Settings are a JSON object owned by the configuration surface. The tile
//! worker reads its fields, flips the persisted error-state flag, and writes
//! the object back through the transport. Keys it does not know about are
//! carried through untouched.
//!
//! # Example
//!
//! ```
//! use hwinfo_deck::config::TileSettings;
//!
//! let settings: TileSettings = serde_json::from_str(
//!     r#"{"sensorUid":"4026532096-0","readingId":"12","divisor":"1000","title":"CPU"}"#,
//! ).unwrap();
//!
//! assert_eq!(settings.target(), Some(("4026532096-0", 12)));
//! assert_eq!(settings.divisor().unwrap(), Some(1000.0));
//! assert!(settings.extra.contains_key("title"));
//! ```

use crate::error::TileConfigError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Settings of one tile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSettings {
    /// Uid of the selected sensor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_uid: Option<String>,

    /// Id of the selected reading on that sensor
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_reading_id",
        serialize_with = "serialize_reading_id"
    )]
    pub reading_id: Option<u32>,

    /// Decimal number the raw value is divided by before display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divisor: Option<String>,

    /// printf-style display format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Whether the tile last reported the producer as unavailable
    #[serde(default)]
    pub in_error_state: bool,

    /// Keys owned by other parties
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TileSettings {
    /// Selected (sensor uid, reading id), if both are set
    pub fn target(&self) -> Option<(&str, u32)> {
        match (self.sensor_uid.as_deref(), self.reading_id) {
            (Some(uid), Some(id)) if !uid.is_empty() => Some((uid, id)),
            _ => None,
        }
    }

    /// Parsed divisor; `None` when unset or blank
    pub fn divisor(&self) -> Result<Option<f64>, TileConfigError> {
        match self.divisor.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => text
                .parse::<f64>()
                .map(Some)
                .map_err(|_| TileConfigError::InvalidDivisor(text.to_string())),
        }
    }

    /// Format spec; `None` when unset or empty
    pub fn format_spec(&self) -> Option<&str> {
        self.format.as_deref().filter(|f| !f.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingIdRepr {
    Number(u32),
    Text(String),
}

fn deserialize_reading_id<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<ReadingIdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ReadingIdRepr::Number(id)) => Ok(Some(id)),
        Some(ReadingIdRepr::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(ReadingIdRepr::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid readingId {:?}", text))),
    }
}

fn serialize_reading_id<S>(id: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(id) => serializer.serialize_u32(*id),
        None => serializer.serialize_none(),
    }
}
