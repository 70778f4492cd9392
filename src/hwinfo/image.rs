//! Producer-layout region images
//!
//! [`RegionImageBuilder`] writes the same packed layout the producer publishes.
//! It is used to create dump files for the replay source, and by tests and
//! benchmarks that need realistic region bytes without a running producer.
//!
//! # Example
//!
//! ```
//! use hwinfo_deck::hwinfo::image::RegionImageBuilder;
//! use hwinfo_deck::types::ReadingType;
//!
//! let mut builder = RegionImageBuilder::new();
//! let cpu = builder.sensor(0xF000_0100, 0, "CPU [#0]: AMD Ryzen 7");
//! builder.reading(cpu, 1, ReadingType::Temperature, "CPU (Tctl/Tdie)", "°C", 54.25);
//! let bytes = builder.build();
//!
//! let snapshot = hwinfo_deck::hwinfo::decode(&bytes).unwrap();
//! assert_eq!(snapshot.readings[0].value, 54.25);
//! ```

use crate::hwinfo::layout::{
    HEADER_SIZE, READING_ELEMENT_MIN, SENSOR_ELEMENT_MIN, SIGNATURE, STRING_LEN, UNIT_LEN,
};
use crate::types::ReadingType;

/// Sensor element to write
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSensor {
    pub sensor_id: u32,
    pub instance: u32,
    pub original_name: String,
    pub user_name: String,
}

/// Reading element to write
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReading {
    /// Raw producer type code (see [`ReadingType::code`])
    pub type_code: u32,
    pub sensor_index: u32,
    pub reading_id: u32,
    pub original_label: String,
    pub user_label: String,
    pub unit: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Builder for a complete region image
#[derive(Debug, Clone)]
pub struct RegionImageBuilder {
    signature: u32,
    version: u32,
    revision: u32,
    poll_time: i64,
    sensor_element_size: u32,
    reading_element_size: u32,
    sensors: Vec<ImageSensor>,
    readings: Vec<ImageReading>,
}

impl Default for RegionImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionImageBuilder {
    /// Empty live region with the minimum element sizes
    pub fn new() -> Self {
        Self {
            signature: SIGNATURE,
            version: 2,
            revision: 0,
            poll_time: 0,
            sensor_element_size: SENSOR_ELEMENT_MIN as u32,
            reading_element_size: READING_ELEMENT_MIN as u32,
            sensors: Vec::new(),
            readings: Vec::new(),
        }
    }

    /// Override the header signature
    pub fn signature(mut self, signature: u32) -> Self {
        self.signature = signature;
        self
    }

    /// Set the layout version and revision
    pub fn version(mut self, version: u32, revision: u32) -> Self {
        self.version = version;
        self.revision = revision;
        self
    }

    /// Set the poll time (unix seconds)
    pub fn poll_time(mut self, poll_time: i64) -> Self {
        self.poll_time = poll_time;
        self
    }

    /// Override the declared sensor stride
    pub fn sensor_element_size(mut self, size: u32) -> Self {
        self.sensor_element_size = size;
        self
    }

    /// Override the declared reading stride
    pub fn reading_element_size(mut self, size: u32) -> Self {
        self.reading_element_size = size;
        self
    }

    /// Add a sensor and return its index
    pub fn sensor(&mut self, sensor_id: u32, instance: u32, name: &str) -> u32 {
        self.push_sensor(ImageSensor {
            sensor_id,
            instance,
            original_name: name.to_string(),
            user_name: name.to_string(),
        })
    }

    /// Add a fully specified sensor and return its index
    pub fn push_sensor(&mut self, sensor: ImageSensor) -> u32 {
        self.sensors.push(sensor);
        (self.sensors.len() - 1) as u32
    }

    /// Add a reading to the sensor at `sensor_index`
    pub fn reading(
        &mut self,
        sensor_index: u32,
        reading_id: u32,
        reading_type: ReadingType,
        label: &str,
        unit: &str,
        value: f64,
    ) {
        self.push_reading(ImageReading {
            type_code: reading_type.code(),
            sensor_index,
            reading_id,
            original_label: label.to_string(),
            user_label: label.to_string(),
            unit: unit.to_string(),
            value,
            min: value,
            max: value,
            avg: value,
        });
    }

    /// Add a fully specified reading
    pub fn push_reading(&mut self, reading: ImageReading) {
        self.readings.push(reading);
    }

    /// Mutable access to the readings, e.g. to move values between images
    pub fn readings_mut(&mut self) -> &mut [ImageReading] {
        &mut self.readings
    }

    /// Byte offset where the reading section will start
    pub fn reading_section_offset(&self) -> usize {
        HEADER_SIZE + self.sensors.len() * self.sensor_element_size as usize
    }

    /// Write the image
    pub fn build(&self) -> Vec<u8> {
        let sensor_offset = HEADER_SIZE;
        let reading_offset = self.reading_section_offset();
        let total = reading_offset + self.readings.len() * self.reading_element_size as usize;

        let mut out = Vec::with_capacity(total);
        put_u32(&mut out, self.signature);
        put_u32(&mut out, self.version);
        put_u32(&mut out, self.revision);
        out.extend_from_slice(&self.poll_time.to_le_bytes());
        put_u32(&mut out, sensor_offset as u32);
        put_u32(&mut out, self.sensor_element_size);
        put_u32(&mut out, self.sensors.len() as u32);
        put_u32(&mut out, reading_offset as u32);
        put_u32(&mut out, self.reading_element_size);
        put_u32(&mut out, self.readings.len() as u32);

        for sensor in &self.sensors {
            let start = out.len();
            put_u32(&mut out, sensor.sensor_id);
            put_u32(&mut out, sensor.instance);
            put_str(&mut out, &sensor.original_name, STRING_LEN);
            put_str(&mut out, &sensor.user_name, STRING_LEN);
            pad_to(&mut out, start + self.sensor_element_size as usize);
        }

        for reading in &self.readings {
            let start = out.len();
            put_u32(&mut out, reading.type_code);
            put_u32(&mut out, reading.sensor_index);
            put_u32(&mut out, reading.reading_id);
            put_str(&mut out, &reading.original_label, STRING_LEN);
            put_str(&mut out, &reading.user_label, STRING_LEN);
            put_str(&mut out, &reading.unit, UNIT_LEN);
            for v in [reading.value, reading.min, reading.max, reading.avg] {
                out.extend_from_slice(&v.to_le_bytes());
            }
            pad_to(&mut out, start + self.reading_element_size as usize);
        }

        out
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Write a NUL-terminated Latin-1 string into a fixed-width field
fn put_str(out: &mut Vec<u8>, s: &str, len: usize) {
    let mut field = vec![0u8; len];
    for (slot, ch) in field.iter_mut().take(len - 1).zip(s.chars()) {
        *slot = u8::try_from(u32::from(ch)).unwrap_or(b'?');
    }
    out.extend_from_slice(&field);
}

// Strides shorter than the written fields are allowed so malformed images can
// be produced; the excess is cut off.
fn pad_to(out: &mut Vec<u8>, end: usize) {
    out.resize(end, 0);
}
