//! Wire protocol between the supervisor and the telemetry worker
//!
//! The worker is spawned with piped stdin/stdout. Each message is one line of
//! JSON. After start-up the worker writes a single [`Handshake`] line; from then
//! on every [`RequestEnvelope`] on its stdin is answered by exactly one
//! [`ResponseEnvelope`] with the same id on its stdout. Logs go to stderr.

use crate::error::RemoteError;
use crate::types::{Reading, Sensor, Snapshot};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};

/// Bumped whenever a message shape changes
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the magic cookie
pub const MAGIC_COOKIE_KEY: &str = "HWINFO_DECK_PLUGIN";

/// Expected magic cookie value
pub const MAGIC_COOKIE_VALUE: &str = "c2e0a4f3-hwinfo-telemetry";

/// Environment variable carrying the per-launch session token
pub const SESSION_TOKEN_KEY: &str = "HWINFO_DECK_SESSION";

/// Environment variable carrying the reader config as JSON
pub const READER_CONFIG_KEY: &str = "HWINFO_DECK_READER";

/// First line written by the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u32,
    /// Echo of the session token the worker was launched with
    pub token: String,
    pub pid: u32,
}

/// A call to the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    /// Every sensor in the current snapshot
    ListSensors,
    /// Every reading of one sensor in the current snapshot
    ReadingsForSensor { sensor_uid: String },
    /// The whole current snapshot
    Snapshot,
    /// Stop serving and exit
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: u64,
    pub request: Request,
}

/// A successful reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Sensors(Vec<Sensor>),
    Readings(Vec<Reading>),
    Snapshot(Snapshot),
    Ack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: u64,
    pub result: Result<Response, RemoteError>,
}

/// Write one message as a JSON line and flush
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, message)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Read one message; `Ok(None)` at end of stream
///
/// Blank lines are skipped.
pub fn read_message<R: BufRead, T: for<'de> Deserialize<'de>>(
    reader: &mut R,
) -> std::io::Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(line.trim_end())
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use std::io::Cursor;

    #[test]
    fn test_request_wire_shape() {
        let envelope = RequestEnvelope {
            id: 3,
            request: Request::ReadingsForSensor {
                sensor_uid: "1-0".into(),
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 3, "request": {"method": "readings_for_sensor", "sensor_uid": "1-0"}})
        );
    }

    #[test]
    fn test_error_response_wire_shape() {
        let envelope = ResponseEnvelope {
            id: 9,
            result: Err(RemoteError::new(RemoteErrorKind::UnknownSensor, "no sensor 7-0")),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["result"]["Err"]["kind"], "unknown_sensor");
    }

    #[test]
    fn test_line_framing() {
        let mut buf = Vec::new();
        write_message(&mut buf, &RequestEnvelope { id: 1, request: Request::ListSensors }).unwrap();
        buf.extend_from_slice(b"\n");
        write_message(&mut buf, &RequestEnvelope { id: 2, request: Request::Shutdown }).unwrap();

        let mut reader = Cursor::new(buf);
        let first: RequestEnvelope = read_message(&mut reader).unwrap().unwrap();
        let second: RequestEnvelope = read_message(&mut reader).unwrap().unwrap();
        let end: Option<RequestEnvelope> = read_message(&mut reader).unwrap();

        assert_eq!(first.request, Request::ListSensors);
        assert_eq!(second.id, 2);
        assert!(end.is_none());
    }

    #[test]
    fn test_garbage_line_is_invalid_data() {
        let mut reader = Cursor::new(b"not json\n".to_vec());
        let err = read_message::<_, Handshake>(&mut reader).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_ack_response_round_trip() {
        let envelope = ResponseEnvelope {
            id: 4,
            result: Ok(Response::Ack),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &envelope).unwrap();
        let parsed: ResponseEnvelope = read_message(&mut Cursor::new(buf)).unwrap().unwrap();
        assert_eq!(parsed, envelope);
    }
}
