//! Exponential reconnection backoff.

use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Default cap on the reconnection delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Default growth factor applied after each failed attempt.
pub const DEFAULT_MULTIPLIER: u32 = 2;

/// Static parameters of the reconnection backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl BackoffPolicy {
    /// Delay in effect after `failures` consecutive failed attempts:
    /// `initial_delay * multiplier^failures`, capped at `max_delay`.
    pub fn delay_after_failures(&self, failures: u32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 0..failures {
            if delay >= self.max_delay {
                break;
            }
            delay = delay
                .checked_mul(self.multiplier)
                .unwrap_or(self.max_delay)
                .min(self.max_delay);
        }
        delay
    }
}

/// Mutable backoff state owned by the supervision task.
///
/// `initial_delay <= current <= max_delay` holds at all times.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let policy = BackoffPolicy {
            initial_delay: policy.initial_delay.min(policy.max_delay),
            multiplier: policy.multiplier.max(1),
            ..policy
        };
        Self {
            current: policy.initial_delay,
            policy,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// The delay the next retry will wait.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Take the delay for the retry being scheduled now and grow the delay
    /// for the one after it.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.policy.multiplier)
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay);
        delay
    }

    /// Back to `initial_delay`; called on every successful connection.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_retry_uses_initial_delay() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.current(), Duration::from_secs(10));
    }

    #[test]
    fn test_delay_sequence_caps_at_max() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
    }

    #[test]
    fn test_current_after_n_failures_matches_policy() {
        let policy = BackoffPolicy::default();
        let mut backoff = Backoff::new(policy);
        for failures in 0..10 {
            assert_eq!(
                backoff.current(),
                policy.delay_after_failures(failures),
                "after {failures} failures"
            );
            backoff.next_delay();
        }
    }

    #[test]
    fn test_four_failures_reach_cap() {
        // 5s -> 10s -> 20s -> 40s -> 60s (capped)
        assert_eq!(
            BackoffPolicy::default().delay_after_failures(4),
            Duration::from_secs(60)
        );
        assert_eq!(
            BackoffPolicy::default().delay_after_failures(3),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn test_reset_after_many_failures() {
        let mut backoff = Backoff::default();
        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.current(), Duration::from_secs(60));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_secs(5));
    }

    #[test]
    fn test_large_failure_count_does_not_overflow() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::MAX,
            multiplier: 10,
        };
        let mut backoff = Backoff::new(policy);
        for _ in 0..200 {
            backoff.next_delay();
        }
        assert_eq!(backoff.current(), Duration::MAX);
    }

    #[test]
    fn test_initial_above_max_is_clamped() {
        let backoff = Backoff::new(BackoffPolicy {
            initial_delay: Duration::from_secs(90),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        });
        assert_eq!(backoff.current(), Duration::from_secs(60));
    }

    #[test]
    fn test_multiplier_of_one_keeps_delay_constant() {
        let mut backoff = Backoff::new(BackoffPolicy {
            multiplier: 1,
            ..BackoffPolicy::default()
        });
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }
}
