//! Memory region decoder
//!
//! Turns a copied region into a [`Snapshot`]. Decoding is two-phase: the header
//! is parsed first to learn the true record length, and only then are the
//! variable sections parsed from a slice cut to that length. Decoding is pure;
//! retrying is the caller's business.

use crate::error::{DecodeError, Section};
use crate::hwinfo::cursor::ByteCursor;
use crate::hwinfo::layout::{
    RecordHeader, HEADER_SIZE, READING_ID_OFFSET, READING_LABEL_ORIG_OFFSET,
    READING_LABEL_USER_OFFSET, READING_SENSOR_INDEX_OFFSET, READING_TYPE_OFFSET,
    READING_UNIT_OFFSET, READING_VALUE_OFFSET, SENSOR_ID_OFFSET, SENSOR_INSTANCE_OFFSET,
    SENSOR_NAME_ORIG_OFFSET, SENSOR_NAME_USER_OFFSET, STRING_LEN, UNIT_LEN,
};
use crate::types::{sensor_uid, Reading, ReadingType, Sensor, Snapshot};
use chrono::DateTime;
use std::collections::HashSet;

/// Validate the header at the start of `bytes` and return the full record length
///
/// This is the first phase of a read: it only looks at the header, checks the
/// signature, and verifies the declared record fits in `bytes`.
pub fn required_length(bytes: &[u8]) -> Result<usize, DecodeError> {
    let header = RecordHeader::parse(bytes)?;
    header.check_signature()?;
    checked_total(&header, bytes.len())
}

fn checked_total(header: &RecordHeader, available: usize) -> Result<usize, DecodeError> {
    let total = header.total_length().max(HEADER_SIZE as u64);
    if total > available as u64 {
        return Err(DecodeError::TruncatedRegion {
            needed: total,
            available,
        });
    }
    Ok(total as usize)
}

/// Decode a copied region into a snapshot
pub fn decode(bytes: &[u8]) -> Result<Snapshot, DecodeError> {
    let header = RecordHeader::parse(bytes)?;
    header.check_signature()?;
    let total = checked_total(&header, bytes.len())?;

    // Everything below reads from the record only, never past its declared end
    let record = &bytes[..total];

    header.check_strides()?;
    if header.sensors.end() > total as u64 {
        return Err(DecodeError::malformed(
            Section::Sensors,
            format!(
                "section ends at {} past record end {}",
                header.sensors.end(),
                total
            ),
        ));
    }
    if (header.sensors.offset as usize) < HEADER_SIZE && header.sensors.count > 0 {
        return Err(DecodeError::malformed(
            Section::Sensors,
            "section overlaps the header",
        ));
    }
    if (header.readings.offset as usize) < HEADER_SIZE && header.readings.count > 0 {
        return Err(DecodeError::malformed(
            Section::Readings,
            "section overlaps the header",
        ));
    }

    let sensors = (0..header.sensors.count)
        .map(|i| decode_sensor(record, header.sensors.element_offset(i)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::with_capacity(header.readings.count as usize);
    let mut readings = Vec::with_capacity(header.readings.count as usize);
    for i in 0..header.readings.count {
        let reading = decode_reading(record, header.readings.element_offset(i), &sensors)?;
        if !seen.insert((reading.sensor_uid.clone(), reading.id)) {
            return Err(DecodeError::malformed(
                Section::Readings,
                format!(
                    "duplicate reading {} on sensor {}",
                    reading.id, reading.sensor_uid
                ),
            ));
        }
        readings.push(reading);
    }

    Ok(Snapshot {
        version: header.version,
        revision: header.revision,
        poll_time: DateTime::from_timestamp(header.poll_time, 0),
        sensors,
        readings,
    })
}

fn decode_sensor(record: &[u8], base: usize) -> Result<Sensor, DecodeError> {
    let mut cur = ByteCursor::at(record, base + SENSOR_ID_OFFSET);
    let sensor_id = cur.read_u32()?;
    cur.seek(base + SENSOR_INSTANCE_OFFSET);
    let instance = cur.read_u32()?;
    cur.seek(base + SENSOR_NAME_ORIG_OFFSET);
    let original_name = cur.read_str(STRING_LEN)?;
    cur.seek(base + SENSOR_NAME_USER_OFFSET);
    let user_name = cur.read_str(STRING_LEN)?;

    Ok(Sensor {
        uid: sensor_uid(sensor_id, instance),
        sensor_id,
        instance,
        name: prefer_user(user_name, &original_name),
        original_name,
    })
}

fn decode_reading(record: &[u8], base: usize, sensors: &[Sensor]) -> Result<Reading, DecodeError> {
    let mut cur = ByteCursor::at(record, base + READING_TYPE_OFFSET);
    let type_code = cur.read_u32()?;
    cur.seek(base + READING_SENSOR_INDEX_OFFSET);
    let sensor_index = cur.read_u32()?;
    cur.seek(base + READING_ID_OFFSET);
    let id = cur.read_u32()?;
    cur.seek(base + READING_LABEL_ORIG_OFFSET);
    let original_label = cur.read_str(STRING_LEN)?;
    cur.seek(base + READING_LABEL_USER_OFFSET);
    let user_label = cur.read_str(STRING_LEN)?;
    cur.seek(base + READING_UNIT_OFFSET);
    let unit = cur.read_str(UNIT_LEN)?;
    cur.seek(base + READING_VALUE_OFFSET);
    let value = cur.read_f64()?;
    let min = cur.read_f64()?;
    let max = cur.read_f64()?;
    let avg = cur.read_f64()?;

    let reading_type = ReadingType::from_code(type_code);
    let sensor = sensors.get(sensor_index as usize).ok_or_else(|| {
        DecodeError::malformed(
            Section::Readings,
            format!(
                "reading {} refers to sensor index {} of {}",
                id,
                sensor_index,
                sensors.len()
            ),
        )
    })?;

    Ok(Reading {
        sensor_uid: sensor.uid.clone(),
        id,
        reading_type,
        label: prefer_user(user_label, &original_label),
        original_label,
        unit,
        value,
        min,
        max,
        avg,
    })
}

fn prefer_user(user: String, original: &str) -> String {
    if user.is_empty() {
        original.to_string()
    } else {
        user
    }
}
