//! Cooperative cancellation and deadline tracking shared by every streaming
//! pull (C5) and by request-level cancellation (C6).
//!
//! A `PullTimeout` pairs an `Instant`-based deadline with an `Arc<AtomicBool>`
//! cancellation flag so a `CancelHandle` cloned out to another task can stop
//! an in-progress pull without owning it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Raised when a deadline elapses or a handle explicitly cancels.
#[derive(Debug, Clone)]
pub struct PullTimeoutError {
    pub timeout: Duration,
    pub elapsed: Duration,
}

impl std::fmt::Display for PullTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pull exceeded timeout of {:?} (ran for {:?})", self.timeout, self.elapsed)
    }
}

impl std::error::Error for PullTimeoutError {}

/// Deadline/cancellation controller for one pull loop or one request.
/// Clonable and safe to share across tasks; `cancel_handle` hands out a
/// detached handle that can trip cancellation from elsewhere.
#[derive(Clone)]
pub struct PullTimeout {
    cancelled: Arc<AtomicBool>,
    start_time: Instant,
    timeout_duration: Option<Duration>,
}

impl PullTimeout {
    pub fn new(timeout: Option<Duration>) -> Self {
        PullTimeout { cancelled: Arc::new(AtomicBool::new(false)), start_time: Instant::now(), timeout_duration: timeout }
    }

    pub fn infinite() -> Self {
        PullTimeout::new(None)
    }

    /// Returns `Err` once cancelled or once the deadline has elapsed; callers
    /// poll this between pulls rather than relying on a single check.
    pub fn check(&self) -> Result<(), PullTimeoutError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(PullTimeoutError { timeout: self.timeout_duration.unwrap_or(Duration::ZERO), elapsed: self.start_time.elapsed() });
        }
        if let Some(timeout) = self.timeout_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > timeout {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(PullTimeoutError { timeout, elapsed });
            }
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.timeout_duration.map(|timeout| {
            let elapsed = self.start_time.elapsed();
            if elapsed >= timeout { Duration::ZERO } else { timeout - elapsed }
        })
    }

    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.cancelled.store(false, Ordering::Relaxed);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { cancelled: Arc::clone(&self.cancelled) }
    }
}

impl Default for PullTimeout {
    fn default() -> Self {
        PullTimeout::new(Some(Duration::from_secs(60)))
    }
}

/// Detached cancellation switch for a request or a pull loop. Cloning a
/// `PullTimeout`'s handle out lets a `stop_solution_request` call (or process
/// shutdown) cancel a task it does not own.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// A handle that starts uncancelled and is never shared with a
    /// request-level controller; used for per-solution RPCs, which must run
    /// to completion even after the owning request is cancelled (spec §4.6
    /// step 9).
    pub fn new() -> Self {
        CancelHandle { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn no_timeout_never_errors() {
        let timeout = PullTimeout::new(None);
        assert!(timeout.check().is_ok());
        assert!(!timeout.is_cancelled());
    }

    #[test]
    fn timeout_not_yet_exceeded() {
        let timeout = PullTimeout::new(Some(Duration::from_secs(10)));
        assert!(timeout.check().is_ok());
    }

    #[test]
    fn explicit_cancellation_is_observed() {
        let timeout = PullTimeout::new(Some(Duration::from_secs(10)));
        timeout.cancel();
        assert!(timeout.is_cancelled());
        assert!(timeout.check().is_err());
    }

    #[test]
    fn cancel_handle_reaches_the_controller() {
        let timeout = PullTimeout::new(Some(Duration::from_secs(10)));
        let handle = timeout.cancel_handle();
        handle.cancel();
        assert!(timeout.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn exceeding_the_deadline_is_an_error() {
        let timeout = PullTimeout::new(Some(Duration::from_millis(10)));
        thread::sleep(Duration::from_millis(50));
        let err = timeout.check().unwrap_err();
        assert!(err.elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn remaining_counts_down() {
        let timeout = PullTimeout::new(Some(Duration::from_secs(10)));
        let remaining = timeout.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining > Duration::from_secs(9));
    }

    #[test]
    fn reset_clears_cancellation() {
        let mut timeout = PullTimeout::new(Some(Duration::from_secs(10)));
        timeout.cancel();
        timeout.reset();
        assert!(!timeout.is_cancelled());
        assert!(timeout.check().is_ok());
    }

    #[test]
    fn fresh_cancel_handle_starts_uncancelled() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
    }
}
