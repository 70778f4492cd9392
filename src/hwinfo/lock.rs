//! Cross-process guard
//!
//! The producer serializes writes to its region with a named, system-wide
//! mutex. Every read holds that mutex through a [`ScopedLock`], which releases
//! it on drop so no exit path can leave the producer blocked.

use crate::error::FetchError;
use std::time::Duration;

/// A named lock shared with the producer process
///
/// Implementations must bound the wait in [`try_acquire`](Self::try_acquire)
/// and report an expired wait as [`FetchError::LockTimeout`].
#[cfg_attr(test, mockall::automock)]
pub trait CrossProcessLock: Send {
    /// Wait up to `timeout` for exclusive ownership
    fn try_acquire(&mut self, timeout: Duration) -> Result<(), FetchError>;

    /// Give up ownership obtained by a successful `try_acquire`
    fn release(&mut self);
}

/// Lock that is always free, for sources with no producer to coordinate with
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLock;

impl CrossProcessLock for NoopLock {
    fn try_acquire(&mut self, _timeout: Duration) -> Result<(), FetchError> {
        Ok(())
    }

    fn release(&mut self) {}
}

/// Held ownership of a [`CrossProcessLock`]
pub struct ScopedLock<'a> {
    lock: &'a mut dyn CrossProcessLock,
}

impl<'a> ScopedLock<'a> {
    /// Acquire `lock`, waiting at most `timeout`
    pub fn acquire(
        lock: &'a mut dyn CrossProcessLock,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        lock.try_acquire(timeout)?;
        Ok(Self { lock })
    }
}

impl Drop for ScopedLock<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_guard_releases_on_drop() {
        let mut seq = Sequence::new();
        let mut lock = MockCrossProcessLock::new();
        lock.expect_try_acquire()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        lock.expect_release().times(1).in_sequence(&mut seq).return_const(());

        let guard = ScopedLock::acquire(&mut lock, Duration::from_millis(10)).unwrap();
        drop(guard);
    }

    #[test]
    fn test_failed_acquire_does_not_release() {
        let mut lock = MockCrossProcessLock::new();
        lock.expect_try_acquire().times(1).returning(|timeout| {
            Err(FetchError::LockTimeout { timeout })
        });
        lock.expect_release().never();

        let result = ScopedLock::acquire(&mut lock, Duration::from_millis(25));
        assert_eq!(
            result.err(),
            Some(FetchError::LockTimeout {
                timeout: Duration::from_millis(25)
            })
        );
    }

    #[test]
    fn test_noop_lock() {
        let mut lock = NoopLock;
        let guard = ScopedLock::acquire(&mut lock, Duration::ZERO);
        assert!(guard.is_ok());
    }
}
