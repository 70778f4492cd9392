//! Telemetry reader
//!
//! Composes the guard, the region and the decoder into one "fetch the current
//! snapshot" operation with bounded retry.
//!
//! # Read protocol
//!
//! Each attempt:
//!
//! 1. acquires the producer's lock with a bounded wait,
//! 2. maps a view of the region,
//! 3. validates the header and learns the full record length,
//! 4. copies exactly that many bytes into the reader's scratch buffer,
//! 5. unmaps the view and releases the lock (in that order, on every path).
//!
//! The copy is decoded after the lock is gone. A failure in steps 1-3 is retried
//! after a fixed delay; a copy that fails to decode is reported immediately.

use crate::error::FetchError;
use crate::hwinfo::decoder::{decode, required_length};
use crate::hwinfo::lock::{CrossProcessLock, ScopedLock};
use crate::hwinfo::region::SharedRegion;
use crate::types::Snapshot;
use std::time::Duration;

/// Initial size of the scratch buffer
pub const DEFAULT_SCRATCH_BYTES: usize = 200_000;

/// Retry bounds for [`TelemetryReader::fetch_snapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up (at least 1)
    pub max_attempts: u32,
    /// Pause between failed attempts
    pub retry_delay: Duration,
    /// Bound on each lock wait
    pub lock_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
            lock_timeout: Duration::from_millis(250),
        }
    }
}

/// Reads snapshots from one producer region
///
/// Not meant for concurrent use: the scratch buffer is reused across calls.
pub struct TelemetryReader {
    lock: Box<dyn CrossProcessLock>,
    region: Box<dyn SharedRegion>,
    policy: RetryPolicy,
    scratch: Vec<u8>,
}

impl TelemetryReader {
    pub fn new(
        lock: Box<dyn CrossProcessLock>,
        region: Box<dyn SharedRegion>,
        policy: RetryPolicy,
    ) -> Self {
        Self::with_scratch_capacity(lock, region, policy, DEFAULT_SCRATCH_BYTES)
    }

    pub fn with_scratch_capacity(
        lock: Box<dyn CrossProcessLock>,
        region: Box<dyn SharedRegion>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> Self {
        Self {
            lock,
            region,
            policy,
            scratch: vec![0; capacity],
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Current scratch buffer size
    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Fetch one decoded snapshot
    pub fn fetch_snapshot(&mut self) -> Result<Snapshot, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        let len = loop {
            match self.copy_region() {
                Ok(len) => break len,
                Err(err) => {
                    if let FetchError::DecodeFailure(decode) = &err {
                        if decode.is_producer_inactive() {
                            tracing::debug!(attempt, "Producer has shared memory switched off");
                        }
                    }
                    tracing::debug!(attempt, attempts, error = %err, "Region read attempt failed");
                    if attempt >= attempts {
                        return Err(FetchError::ProducerUnavailable {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }
                    attempt += 1;
                    std::thread::sleep(self.policy.retry_delay);
                }
            }
        };

        let snapshot = decode(&self.scratch[..len])?;
        tracing::trace!(
            sensors = snapshot.sensors.len(),
            readings = snapshot.readings.len(),
            attempt,
            "Decoded snapshot"
        );
        Ok(snapshot)
    }

    /// One guarded copy into the scratch buffer; returns the record length
    fn copy_region(&mut self) -> Result<usize, FetchError> {
        let _guard = ScopedLock::acquire(self.lock.as_mut(), self.policy.lock_timeout)?;
        // Dropped before the guard, so the view is unmapped while the lock is held
        let view = self.region.map_view()?;
        let bytes = view.as_bytes();
        let len = required_length(bytes)?;

        if self.scratch.len() < len {
            tracing::debug!(from = self.scratch.len(), to = len, "Growing scratch buffer");
            self.scratch.resize(len, 0);
        }
        self.scratch[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::hwinfo::image::RegionImageBuilder;
    use crate::hwinfo::lock::{MockCrossProcessLock, NoopLock};
    use crate::hwinfo::region::{InMemoryRegion, UnavailableRegion};
    use crate::types::ReadingType;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            retry_delay: Duration::from_millis(1),
            lock_timeout: Duration::from_millis(1),
        }
    }

    fn sample_region() -> Vec<u8> {
        let mut builder = RegionImageBuilder::new();
        let s = builder.sensor(100, 0, "Motherboard");
        builder.reading(s, 1, ReadingType::Temperature, "System", "°C", 35.0);
        builder.reading(s, 2, ReadingType::Fan, "CPU Fan", "RPM", 900.0);
        builder.build()
    }

    #[test]
    fn test_lock_timeouts_then_success_takes_five_attempts() {
        let mut lock = MockCrossProcessLock::new();
        let mut calls = 0;
        lock.expect_try_acquire().times(5).returning(move |timeout| {
            calls += 1;
            if calls < 5 {
                Err(FetchError::LockTimeout { timeout })
            } else {
                Ok(())
            }
        });
        lock.expect_release().times(1).return_const(());

        let mut reader = TelemetryReader::new(
            Box::new(lock),
            Box::new(InMemoryRegion::new(sample_region())),
            fast_policy(),
        );
        let snapshot = reader.fetch_snapshot().unwrap();
        assert_eq!(snapshot.readings.len(), 2);
    }

    #[test]
    fn test_exhausted_retries_report_producer_unavailable() {
        let mut lock = MockCrossProcessLock::new();
        lock.expect_try_acquire().times(3).returning(|_| Ok(()));
        lock.expect_release().times(3).return_const(());

        let mut reader = TelemetryReader::new(
            Box::new(lock),
            Box::new(UnavailableRegion::new("no mapping")),
            RetryPolicy {
                max_attempts: 3,
                ..fast_policy()
            },
        );

        match reader.fetch_snapshot() {
            Err(FetchError::ProducerUnavailable { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, FetchError::MappingFailure("no mapping".into()));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_bad_header_is_retried_and_released() {
        let region = InMemoryRegion::new(
            RegionImageBuilder::new()
                .signature(crate::hwinfo::layout::INACTIVE_SIGNATURE)
                .build(),
        );
        let mut lock = MockCrossProcessLock::new();
        lock.expect_try_acquire().times(2).returning(|_| Ok(()));
        lock.expect_release().times(2).return_const(());

        let mut reader = TelemetryReader::new(
            Box::new(lock),
            Box::new(region),
            RetryPolicy {
                max_attempts: 2,
                ..fast_policy()
            },
        );
        let err = reader.fetch_snapshot().unwrap_err();
        assert!(matches!(
            err,
            FetchError::ProducerUnavailable { ref last, .. }
                if matches!(**last, FetchError::DecodeFailure(DecodeError::BadSignature { .. }))
        ));
    }

    #[test]
    fn test_scratch_buffer_grows_and_never_shrinks() {
        let handle = InMemoryRegion::new(sample_region());
        let mut reader = TelemetryReader::with_scratch_capacity(
            Box::new(NoopLock),
            Box::new(handle.clone()),
            fast_policy(),
            64,
        );

        let first = reader.fetch_snapshot().unwrap();
        let grown = reader.scratch_len();
        assert!(grown >= sample_region().len());
        assert_eq!(first.readings.len(), 2);

        // A smaller region decodes from the front of the larger buffer
        let mut small = RegionImageBuilder::new();
        small.sensor(7, 0, "Drive");
        handle.replace(small.build());
        let second = reader.fetch_snapshot().unwrap();
        assert!(second.readings.is_empty());
        assert_eq!(second.sensors[0].name, "Drive");
        assert_eq!(reader.scratch_len(), grown);
    }

    #[test]
    fn test_record_shorter_than_view_copies_only_record() {
        let mut bytes = sample_region();
        let record_len = bytes.len();
        bytes.extend_from_slice(&[0xAB; 4096]);

        let mut reader = TelemetryReader::with_scratch_capacity(
            Box::new(NoopLock),
            Box::new(InMemoryRegion::new(bytes)),
            fast_policy(),
            record_len,
        );
        assert!(reader.fetch_snapshot().is_ok());
        assert_eq!(reader.scratch_len(), record_len);
    }

    #[test]
    fn test_malformed_copy_is_not_retried() {
        let mut builder = RegionImageBuilder::new();
        let s = builder.sensor(1, 0, "CPU");
        builder.reading(s, 1, ReadingType::Clock, "Core", "MHz", 1.0);
        builder.readings_mut()[0].type_code = 99;

        let mut lock = MockCrossProcessLock::new();
        lock.expect_try_acquire().times(1).returning(|_| Ok(()));
        lock.expect_release().times(1).return_const(());

        let mut reader = TelemetryReader::new(
            Box::new(lock),
            Box::new(InMemoryRegion::new(builder.build())),
            fast_policy(),
        );
        assert!(matches!(
            reader.fetch_snapshot(),
            Err(FetchError::DecodeFailure(DecodeError::MalformedElement { .. }))
        ));
    }
}
