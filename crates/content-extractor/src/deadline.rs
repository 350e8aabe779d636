//! Cooperative per-file time budget.
//!
//! Extractors call [`DeadlineGuard::check_timeout`] at natural iteration
//! boundaries (a chunk, a page, a paragraph, a row). Nothing is preempted: the
//! worst-case overrun is the cost of one iteration unit.

use crate::ExtractError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Lets tests and simulations place a
/// checkpoint exactly on either side of the budget.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Budget policy shared by all tasks of a batch. Each extraction calls
/// [`Deadline::enter`] to get its own guard.
#[derive(Debug, Clone)]
pub struct Deadline {
    budget: Duration,
    clock: Arc<dyn Clock>,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self::with_clock(budget, Arc::new(SystemClock))
    }

    pub fn with_clock(budget: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { budget, clock }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Start the clock for one extraction.
    pub fn enter(&self) -> DeadlineGuard {
        DeadlineGuard {
            start: self.clock.now(),
            budget: self.budget,
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Started timer owned by a single extraction. Never reset.
#[derive(Debug)]
pub struct DeadlineGuard {
    start: Instant,
    budget: Duration,
    clock: Arc<dyn Clock>,
}

impl DeadlineGuard {
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Fails once more time than the budget has passed, and on every call after.
    pub fn check_timeout(&self) -> Result<(), ExtractError> {
        let elapsed = self.elapsed();
        if elapsed > self.budget {
            return Err(ExtractError::Timeout {
                elapsed,
                budget: self.budget,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(budget_ms: u64) -> (Arc<ManualClock>, DeadlineGuard) {
        let clock = Arc::new(ManualClock::new());
        let deadline = Deadline::with_clock(Duration::from_millis(budget_ms), clock.clone());
        (clock, deadline.enter())
    }

    #[test]
    fn exactly_at_budget_is_not_expired() {
        let (clock, guard) = manual(100);
        assert!(guard.check_timeout().is_ok());
        clock.advance(Duration::from_millis(100));
        assert!(guard.check_timeout().is_ok());
    }

    #[test]
    fn past_budget_reports_strictly_greater_elapsed() {
        let (clock, guard) = manual(100);
        clock.advance(Duration::from_millis(101));
        match guard.check_timeout() {
            Err(ExtractError::Timeout { elapsed, budget }) => {
                assert!(elapsed > budget);
                assert_eq!(budget, Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn expiry_is_sticky() {
        let (clock, guard) = manual(5);
        clock.advance(Duration::from_millis(6));
        assert!(guard.check_timeout().is_err());
        assert!(guard.check_timeout().is_err());
        clock.advance(Duration::from_millis(1));
        assert!(guard.check_timeout().is_err());
    }

    #[test]
    fn guards_from_one_deadline_are_independent() {
        let clock = Arc::new(ManualClock::new());
        let deadline = Deadline::with_clock(Duration::from_millis(10), clock.clone());
        let first = deadline.enter();
        clock.advance(Duration::from_millis(8));
        let second = deadline.enter();
        clock.advance(Duration::from_millis(8));
        assert!(first.check_timeout().is_err());
        assert!(second.check_timeout().is_ok());
        assert_eq!(second.elapsed(), Duration::from_millis(8));
    }

    #[test]
    fn system_clock_guard_starts_unexpired() {
        let guard = Deadline::new(Duration::from_secs(60)).enter();
        assert!(guard.check_timeout().is_ok());
        assert!(guard.elapsed() < Duration::from_secs(60));
    }
}
