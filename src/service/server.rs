//! Worker-side request loop
//!
//! Runs inside the companion process. Every request triggers one fresh
//! snapshot fetch, so replies always reflect the producer's current state.

use crate::error::{FetchError, RemoteError, RemoteErrorKind};
use crate::hwinfo::reader::TelemetryReader;
use crate::service::protocol::{
    read_message, write_message, Handshake, Request, RequestEnvelope, Response, ResponseEnvelope,
    PROTOCOL_VERSION,
};
use crate::types::Snapshot;
use std::io::{BufRead, ErrorKind, Write};

/// Anything that can produce a fresh snapshot on demand
pub trait SnapshotSource: Send {
    fn fetch_snapshot(&mut self) -> Result<Snapshot, FetchError>;
}

impl SnapshotSource for TelemetryReader {
    fn fetch_snapshot(&mut self) -> Result<Snapshot, FetchError> {
        TelemetryReader::fetch_snapshot(self)
    }
}

/// Why the serve loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The supervisor closed our stdin
    EndOfInput,
    /// A shutdown request was acknowledged
    Shutdown,
}

/// Write the handshake line announcing this worker
pub fn send_handshake<W: Write>(output: &mut W, token: &str) -> std::io::Result<()> {
    write_message(
        output,
        &Handshake {
            protocol_version: PROTOCOL_VERSION,
            token: token.to_string(),
            pid: std::process::id(),
        },
    )
}

/// Answer requests from `input` until it closes or a shutdown arrives
pub fn serve<R: BufRead, W: Write>(
    source: &mut dyn SnapshotSource,
    mut input: R,
    mut output: W,
) -> std::io::Result<ServeOutcome> {
    loop {
        let message: serde_json::Value = match read_message(&mut input) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(ServeOutcome::EndOfInput),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                tracing::warn!("Ignoring unreadable request: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        let id = message.get("id").and_then(serde_json::Value::as_u64);
        let envelope = match (serde_json::from_value::<RequestEnvelope>(message), id) {
            (Ok(envelope), _) => envelope,
            (Err(e), Some(id)) => {
                tracing::warn!(id, "Rejecting malformed request: {}", e);
                let result = Err(RemoteError::new(RemoteErrorKind::BadRequest, e.to_string()));
                write_message(&mut output, &ResponseEnvelope { id, result })?;
                continue;
            }
            (Err(e), None) => {
                tracing::warn!("Ignoring request without an id: {}", e);
                continue;
            }
        };

        let shutdown = envelope.request == Request::Shutdown;
        let result = handle(source, envelope.request);
        write_message(
            &mut output,
            &ResponseEnvelope {
                id: envelope.id,
                result,
            },
        )?;

        if shutdown {
            tracing::info!("Shutdown requested");
            return Ok(ServeOutcome::Shutdown);
        }
    }
}

fn handle(source: &mut dyn SnapshotSource, request: Request) -> Result<Response, RemoteError> {
    match request {
        Request::Shutdown => Ok(Response::Ack),
        Request::ListSensors => fetch(source).map(|s| Response::Sensors(s.sensors)),
        Request::Snapshot => fetch(source).map(Response::Snapshot),
        Request::ReadingsForSensor { sensor_uid } => {
            let snapshot = fetch(source)?;
            if snapshot.sensor(&sensor_uid).is_none() {
                return Err(RemoteError::new(
                    RemoteErrorKind::UnknownSensor,
                    format!("sensor {} not found", sensor_uid),
                ));
            }
            let readings = snapshot
                .readings
                .into_iter()
                .filter(|r| r.sensor_uid == sensor_uid)
                .collect();
            Ok(Response::Readings(readings))
        }
    }
}

fn fetch(source: &mut dyn SnapshotSource) -> Result<Snapshot, RemoteError> {
    source.fetch_snapshot().map_err(|err| {
        match &err {
            FetchError::DecodeFailure(decode) if decode.is_producer_inactive() => {
                tracing::warn!("Producer has shared memory support switched off");
            }
            FetchError::ProducerUnavailable { last, .. } => {
                tracing::debug!("Producer unavailable: {}", last);
            }
            _ => tracing::warn!("Snapshot fetch failed: {}", err),
        }
        RemoteError::from(&err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reading, ReadingType, Sensor};
    use std::io::Cursor;

    struct FixedSource(Result<Snapshot, FetchError>);

    impl SnapshotSource for FixedSource {
        fn fetch_snapshot(&mut self) -> Result<Snapshot, FetchError> {
            self.0.clone()
        }
    }

    fn snapshot() -> Snapshot {
        let reading = |uid: &str, id: u32| Reading {
            sensor_uid: uid.into(),
            id,
            reading_type: ReadingType::Power,
            label: format!("Power {}", id),
            original_label: format!("Power {}", id),
            unit: "W".into(),
            value: 10.0 * id as f64,
            min: 0.0,
            max: 100.0,
            avg: 50.0,
        };
        let sensor = |uid: &str| Sensor {
            uid: uid.into(),
            sensor_id: 0,
            instance: 0,
            name: uid.into(),
            original_name: uid.into(),
        };
        Snapshot {
            sensors: vec![sensor("1-0"), sensor("2-0")],
            readings: vec![reading("1-0", 1), reading("2-0", 1), reading("1-0", 2)],
            ..Default::default()
        }
    }

    fn run(source: &mut dyn SnapshotSource, requests: &[Request]) -> (ServeOutcome, Vec<ResponseEnvelope>) {
        let mut input = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            write_message(
                &mut input,
                &RequestEnvelope {
                    id: i as u64 + 1,
                    request: request.clone(),
                },
            )
            .unwrap();
        }
        let mut output = Vec::new();
        let outcome = serve(source, Cursor::new(input), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        let mut replies = Vec::new();
        while let Some(reply) = read_message(&mut reader).unwrap() {
            replies.push(reply);
        }
        (outcome, replies)
    }

    #[test]
    fn test_readings_for_sensor_filters_by_uid() {
        let mut source = FixedSource(Ok(snapshot()));
        let (outcome, replies) = run(
            &mut source,
            &[Request::ReadingsForSensor {
                sensor_uid: "1-0".into(),
            }],
        );

        assert_eq!(outcome, ServeOutcome::EndOfInput);
        match &replies[0].result {
            Ok(Response::Readings(readings)) => {
                assert_eq!(readings.len(), 2);
                assert!(readings.iter().all(|r| r.sensor_uid == "1-0"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sensor() {
        let mut source = FixedSource(Ok(snapshot()));
        let (_, replies) = run(
            &mut source,
            &[Request::ReadingsForSensor {
                sensor_uid: "9-9".into(),
            }],
        );
        let err = replies[0].result.clone().unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::UnknownSensor);
    }

    #[test]
    fn test_fetch_failure_becomes_remote_error() {
        let mut source = FixedSource(Err(FetchError::ProducerUnavailable {
            attempts: 5,
            last: Box::new(FetchError::MappingFailure("gone".into())),
        }));
        let (_, replies) = run(&mut source, &[Request::ListSensors, Request::Snapshot]);

        assert_eq!(replies.len(), 2);
        for reply in replies {
            assert_eq!(reply.result.unwrap_err().kind, RemoteErrorKind::ProducerUnavailable);
        }
    }

    #[test]
    fn test_shutdown_stops_the_loop() {
        let mut source = FixedSource(Ok(snapshot()));
        let (outcome, replies) = run(
            &mut source,
            &[Request::ListSensors, Request::Shutdown, Request::Snapshot],
        );

        assert_eq!(outcome, ServeOutcome::Shutdown);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[1].id, 2);
        assert_eq!(replies[1].result, Ok(Response::Ack));
    }

    #[test]
    fn test_malformed_request_gets_bad_request_reply() {
        let mut input = b"{\"id\": 1, \"request\": {\"method\": \"reboot\"}}\n".to_vec();
        write_message(
            &mut input,
            &RequestEnvelope {
                id: 2,
                request: Request::ListSensors,
            },
        )
        .unwrap();

        let mut output = Vec::new();
        let mut source = FixedSource(Ok(snapshot()));
        serve(&mut source, Cursor::new(input), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        let rejected: ResponseEnvelope = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(rejected.id, 1);
        assert_eq!(rejected.result.unwrap_err().kind, RemoteErrorKind::BadRequest);

        let answered: ResponseEnvelope = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(answered.id, 2);
        assert!(matches!(answered.result, Ok(Response::Sensors(_))));
    }

    #[test]
    fn test_unreadable_lines_are_skipped() {
        let mut input = b"not json\n{\"request\": {\"method\": \"snapshot\"}}\n".to_vec();
        write_message(
            &mut input,
            &RequestEnvelope {
                id: 7,
                request: Request::Snapshot,
            },
        )
        .unwrap();

        let mut output = Vec::new();
        let mut source = FixedSource(Ok(snapshot()));
        serve(&mut source, Cursor::new(input), &mut output).unwrap();

        let mut reader = Cursor::new(output);
        let reply: ResponseEnvelope = read_message(&mut reader).unwrap().unwrap();
        assert_eq!(reply.id, 7);
        assert!(read_message::<_, ResponseEnvelope>(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_handshake_line() {
        let mut output = Vec::new();
        send_handshake(&mut output, "abc").unwrap();
        let handshake: Handshake = read_message(&mut Cursor::new(output)).unwrap().unwrap();
        assert_eq!(handshake.token, "abc");
        assert_eq!(handshake.protocol_version, PROTOCOL_VERSION);
        assert_eq!(handshake.pid, std::process::id());
    }
}
