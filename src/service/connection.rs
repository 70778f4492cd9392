//! RPC channel to one worker process
//!
//! Requests are written to the worker's stdin; a reader thread parses the
//! worker's stdout into a channel. Calls are serialized: the writer lock is held
//! until the matching reply arrives, so there is at most one request in flight.
//!
//! A connection that times out, fails to write, or sees the worker close its
//! output is marked broken and refuses further calls. The supervisor replaces
//! broken connections.

use crate::error::{ServiceError, SupervisionError};
use crate::service::protocol::{
    read_message, write_message, Handshake, Request, RequestEnvelope, Response, ResponseEnvelope,
    PROTOCOL_VERSION,
};
use crate::types::{Reading, Sensor, Snapshot};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError};
use std::io::{BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Connected RPC channel
pub struct ServiceConnection {
    writer: Mutex<Box<dyn Write + Send>>,
    responses: Receiver<ResponseEnvelope>,
    next_id: AtomicU64,
    broken: AtomicBool,
    call_timeout: Duration,
}

impl std::fmt::Debug for ServiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConnection")
            .field("broken", &self.is_broken())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl ServiceConnection {
    /// Wait for the worker's handshake on `output` and return the connection
    ///
    /// `output` is the worker's stdout, `input` its stdin. The handshake must
    /// echo `token` and carry the current protocol version.
    pub fn establish(
        output: Box<dyn Read + Send>,
        input: Box<dyn Write + Send>,
        token: &str,
        handshake_timeout: Duration,
        call_timeout: Duration,
    ) -> Result<(Self, Handshake), SupervisionError> {
        let (handshake_tx, handshake_rx) = bounded::<Result<Handshake, String>>(1);
        let (response_tx, response_rx) = unbounded();

        std::thread::Builder::new()
            .name("telemetry-rpc-reader".into())
            .spawn(move || {
                let mut reader = BufReader::new(output);
                match read_message::<_, Handshake>(&mut reader) {
                    Ok(Some(handshake)) => {
                        if handshake_tx.send(Ok(handshake)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = handshake_tx.send(Err(e.to_string()));
                        return;
                    }
                }
                drop(handshake_tx);

                loop {
                    match read_message::<_, ResponseEnvelope>(&mut reader) {
                        Ok(Some(envelope)) => {
                            if response_tx.send(envelope).is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::debug!("Telemetry worker closed its output");
                            break;
                        }
                        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                            tracing::warn!("Discarding malformed worker reply: {}", e);
                        }
                        Err(e) => {
                            tracing::debug!("Telemetry worker output failed: {}", e);
                            break;
                        }
                    }
                }
            })
            .map_err(SupervisionError::Spawn)?;

        let handshake = match handshake_rx.recv_timeout(handshake_timeout) {
            Ok(Ok(handshake)) => handshake,
            Ok(Err(reason)) => return Err(SupervisionError::Handshake(reason)),
            Err(RecvTimeoutError::Timeout) => {
                return Err(SupervisionError::HandshakeTimeout(handshake_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(SupervisionError::Handshake(
                    "worker closed its output before the handshake".to_string(),
                ))
            }
        };

        if handshake.protocol_version != PROTOCOL_VERSION {
            return Err(SupervisionError::Handshake(format!(
                "protocol version {} does not match {}",
                handshake.protocol_version, PROTOCOL_VERSION
            )));
        }
        if handshake.token != token {
            return Err(SupervisionError::Handshake(
                "session token mismatch".to_string(),
            ));
        }

        let connection = Self {
            writer: Mutex::new(input),
            responses: response_rx,
            next_id: AtomicU64::new(1),
            broken: AtomicBool::new(false),
            call_timeout,
        };
        Ok((connection, handshake))
    }

    /// Whether the channel has failed
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    fn mark_broken(&self) {
        self.broken.store(true, Ordering::Release);
    }

    /// Send one request and wait for its reply
    pub fn call(&self, request: Request) -> Result<Response, ServiceError> {
        if self.is_broken() {
            return Err(ServiceError::Unavailable("connection is broken".to_string()));
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| ServiceError::Unavailable("connection lock poisoned".to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = write_message(&mut *writer, &RequestEnvelope { id, request }) {
            self.mark_broken();
            return Err(ServiceError::Unavailable(format!("write failed: {}", e)));
        }

        let deadline = Instant::now() + self.call_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(envelope) if envelope.id == id => {
                    return envelope.result.map_err(ServiceError::Remote);
                }
                Ok(envelope) => {
                    tracing::debug!(expected = id, got = envelope.id, "Skipping stale reply");
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.mark_broken();
                    return Err(ServiceError::Timeout(self.call_timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_broken();
                    return Err(ServiceError::Unavailable(
                        "worker closed the channel".to_string(),
                    ));
                }
            }
        }
    }

    pub fn list_sensors(&self) -> Result<Vec<Sensor>, ServiceError> {
        match self.call(Request::ListSensors)? {
            Response::Sensors(sensors) => Ok(sensors),
            other => Err(unexpected("list_sensors", &other)),
        }
    }

    pub fn readings_for_sensor(&self, sensor_uid: &str) -> Result<Vec<Reading>, ServiceError> {
        let request = Request::ReadingsForSensor {
            sensor_uid: sensor_uid.to_string(),
        };
        match self.call(request)? {
            Response::Readings(readings) => Ok(readings),
            other => Err(unexpected("readings_for_sensor", &other)),
        }
    }

    pub fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        match self.call(Request::Snapshot)? {
            Response::Snapshot(snapshot) => Ok(snapshot),
            other => Err(unexpected("snapshot", &other)),
        }
    }

    /// Ask the worker to exit
    pub fn shutdown(&self) -> Result<(), ServiceError> {
        match self.call(Request::Shutdown)? {
            Response::Ack => Ok(()),
            other => Err(unexpected("shutdown", &other)),
        }
    }
}

fn unexpected(method: &str, response: &Response) -> ServiceError {
    let kind = match response {
        Response::Sensors(_) => "sensors",
        Response::Readings(_) => "readings",
        Response::Snapshot(_) => "snapshot",
        Response::Ack => "ack",
    };
    ServiceError::Protocol(format!("unexpected {} reply to {}", kind, method))
}
