//! Producer shared-memory layout
//!
//! The producer publishes a packed, little-endian record: a fixed 44-byte
//! header followed by two fixed-stride element arrays (sensors, readings) at
//! offsets declared in the header. Element strides come from the header too, so
//! newer producers may append fields; only the minimum sizes below are required.

use crate::error::{DecodeError, Section};
use crate::hwinfo::cursor::ByteCursor;

/// Name of the producer's file mapping
pub const MAP_NAME: &str = "Global\\HWiNFO_SENS_SM2";

/// Name of the producer's mutex guarding the mapping
pub const MUTEX_NAME: &str = "Global\\HWiNFO_SM2_MUTEX";

/// Header signature of a live region ("HWiS")
pub const SIGNATURE: u32 = 0x5369_5748;

/// Signature written by the producer when shared memory support is switched off ("DEAD")
pub const INACTIVE_SIGNATURE: u32 = 0x4441_4544;

/// Size of the fixed header
pub const HEADER_SIZE: usize = 44;

/// Length of name/label string fields
pub const STRING_LEN: usize = 128;

/// Length of the unit string field
pub const UNIT_LEN: usize = 16;

/// Minimum size of a sensor element
pub const SENSOR_ELEMENT_MIN: usize = 4 + 4 + STRING_LEN * 2;

/// Minimum size of a reading element
pub const READING_ELEMENT_MIN: usize = 4 + 4 + 4 + STRING_LEN * 2 + UNIT_LEN + 8 * 4;

// Sensor element field offsets
pub(crate) const SENSOR_ID_OFFSET: usize = 0;
pub(crate) const SENSOR_INSTANCE_OFFSET: usize = 4;
pub(crate) const SENSOR_NAME_ORIG_OFFSET: usize = 8;
pub(crate) const SENSOR_NAME_USER_OFFSET: usize = SENSOR_NAME_ORIG_OFFSET + STRING_LEN;

// Reading element field offsets
pub(crate) const READING_TYPE_OFFSET: usize = 0;
pub(crate) const READING_SENSOR_INDEX_OFFSET: usize = 4;
pub(crate) const READING_ID_OFFSET: usize = 8;
pub(crate) const READING_LABEL_ORIG_OFFSET: usize = 12;
pub(crate) const READING_LABEL_USER_OFFSET: usize = READING_LABEL_ORIG_OFFSET + STRING_LEN;
pub(crate) const READING_UNIT_OFFSET: usize = READING_LABEL_USER_OFFSET + STRING_LEN;
pub(crate) const READING_VALUE_OFFSET: usize = READING_UNIT_OFFSET + UNIT_LEN;

/// Placement of one element array inside the region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    /// Byte offset of the first element
    pub offset: u32,
    /// Stride between elements
    pub element_size: u32,
    /// Number of elements
    pub count: u32,
}

impl SectionLayout {
    /// One past the last byte of the section, widened so it cannot overflow
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.element_size as u64 * self.count as u64
    }

    /// Byte offset of element `index`
    pub fn element_offset(&self, index: u32) -> usize {
        (self.offset as u64 + self.element_size as u64 * index as u64) as usize
    }
}

/// The fixed-size record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub signature: u32,
    pub version: u32,
    pub revision: u32,
    /// Producer poll time, unix seconds
    pub poll_time: i64,
    pub sensors: SectionLayout,
    pub readings: SectionLayout,
}

impl RecordHeader {
    /// Parse the header from the start of `bytes`
    ///
    /// Only the header fields are read; the signature is not checked here.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = ByteCursor::new(bytes);
        Ok(Self {
            signature: cur.read_u32()?,
            version: cur.read_u32()?,
            revision: cur.read_u32()?,
            poll_time: cur.read_i64()?,
            sensors: SectionLayout {
                offset: cur.read_u32()?,
                element_size: cur.read_u32()?,
                count: cur.read_u32()?,
            },
            readings: SectionLayout {
                offset: cur.read_u32()?,
                element_size: cur.read_u32()?,
                count: cur.read_u32()?,
            },
        })
    }

    /// Fail unless the signature marks a live region
    pub fn check_signature(&self) -> Result<(), DecodeError> {
        if self.signature != SIGNATURE {
            return Err(DecodeError::BadSignature {
                found: self.signature,
            });
        }
        Ok(())
    }

    /// Full record length: the end of the reading section
    pub fn total_length(&self) -> u64 {
        self.readings.end()
    }

    /// Check element strides against the known minimum sizes
    pub fn check_strides(&self) -> Result<(), DecodeError> {
        if self.sensors.count > 0 && (self.sensors.element_size as usize) < SENSOR_ELEMENT_MIN {
            return Err(DecodeError::malformed(
                Section::Sensors,
                format!(
                    "element size {} below minimum {}",
                    self.sensors.element_size, SENSOR_ELEMENT_MIN
                ),
            ));
        }
        if self.readings.count > 0 && (self.readings.element_size as usize) < READING_ELEMENT_MIN
        {
            return Err(DecodeError::malformed(
                Section::Readings,
                format!(
                    "element size {} below minimum {}",
                    self.readings.element_size, READING_ELEMENT_MIN
                ),
            ));
        }
        Ok(())
    }
}
