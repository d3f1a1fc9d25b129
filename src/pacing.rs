use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::ScrapeResult;

/// Random delay inserted before every navigation to stay under the target
/// site's rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    min: Duration,
    max: Duration,
}

impl PacingPolicy {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    pub fn next_delay(&self, rng: &mut impl Rng) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.gen_range(min..=max))
    }

    pub fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        let delay = self.next_delay(&mut rand::thread_rng());
        debug!(delay_ms = delay.as_millis() as u64, "pacing before navigation");
        thread::sleep(delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the failed attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> ScrapeResult<T>) -> ScrapeResult<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        target_url = what,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient navigation failure, retrying"
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::{PacingPolicy, RetryPolicy};
    use crate::error::ScrapeError;

    fn transient() -> ScrapeError {
        ScrapeError::Navigation {
            url: "u".to_string(),
            message: "timed out".to_string(),
            retryable: true,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let out = RetryPolicy::immediate(3).run("u", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(transient()) } else { Ok(7) }
        });
        assert_eq!(out.expect("third attempt succeeds"), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let calls = Cell::new(0);
        let out: Result<(), _> = RetryPolicy::immediate(2).run("u", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(out.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn fatal_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<(), _> = RetryPolicy::immediate(5).run("u", || {
            calls.set(calls.get() + 1);
            Err(ScrapeError::page_structure("u", "div.duelParticipant__home"))
        });
        assert!(matches!(out, Err(ScrapeError::PageStructure { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn pacing_delay_stays_in_range() {
        let policy = PacingPolicy::new(Duration::from_millis(1000), Duration::from_millis(3000));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let d = policy.next_delay(&mut rng);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(3000));
        }
        assert!(PacingPolicy::disabled().is_disabled());
    }
}
