//! Retry wrapper for transient store failures.
//!
//! # Responsibility
//! - Replay a whole unit of work when it fails with a transient error.
//! - Apply exponential back-off between attempts.
//!
//! # Invariants
//! - Non-transient errors are returned immediately, never replayed.
//! - At least one attempt is always made.
//! - After `max_attempts` the last error is returned unchanged.

use log::warn;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// Errors that can tell whether replaying the failed work may succeed.
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for super::DbError {
    fn is_transient(&self) -> bool {
        super::DbError::is_transient(self)
    }
}

/// Attempt limit and back-off base for `Retryer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first replay; doubles for each later one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Policy that never replays.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_before(&self, replay: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(replay.saturating_sub(1)))
    }
}

/// Runs units of work under a `RetryPolicy`.
#[derive(Debug, Clone, Default)]
pub struct Retryer {
    policy: RetryPolicy,
}

impl Retryer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Runs `action` until it succeeds, fails permanently or runs out of
    /// attempts.
    pub fn execute<T, E, F>(&self, mut action: F) -> Result<T, E>
    where
        E: TransientError + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.policy.delay_before(attempt);
                    warn!(
                        "event=store_retry module=db status=retry attempt={}/{} delay_ms={} error={}",
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        err
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// `execute` for work that yields no value.
    pub fn execute_no_result<E, F>(&self, action: F) -> Result<(), E>
    where
        E: TransientError + std::fmt::Display,
        F: FnMut() -> Result<(), E>,
    {
        self.execute(action)
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, Retryer, TransientError};
    use std::cell::Cell;
    use std::fmt::{Display, Formatter};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Eq)]
    enum FakeError {
        Busy,
        Fatal,
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl TransientError for FakeError {
        fn is_transient(&self) -> bool {
            *self == Self::Busy
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    #[test]
    fn transient_errors_are_replayed_until_success() {
        let retryer = Retryer::new(fast_policy(3));
        let calls = Cell::new(0);

        let result = retryer.execute(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(FakeError::Busy)
            } else {
                Ok(calls.get())
            }
        });

        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_attempts_return_last_error() {
        let retryer = Retryer::new(fast_policy(2));
        let calls = Cell::new(0);

        let result = retryer.execute_no_result(|| {
            calls.set(calls.get() + 1);
            Err(FakeError::Busy)
        });

        assert_eq!(result, Err(FakeError::Busy));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_replayed() {
        let retryer = Retryer::new(fast_policy(5));
        let calls = Cell::new(0);

        let result = retryer.execute_no_result(|| {
            calls.set(calls.get() + 1);
            Err(FakeError::Fatal)
        });

        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let retryer = Retryer::new(fast_policy(0));
        let calls = Cell::new(0);

        let _ = retryer.execute_no_result(|| {
            calls.set(calls.get() + 1);
            Err(FakeError::Busy)
        });

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn back_off_doubles_per_replay() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(10));
        assert_eq!(policy.delay_before(2), Duration::from_millis(20));
        assert_eq!(policy.delay_before(3), Duration::from_millis(40));
    }
}
