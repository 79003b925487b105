//! Bounded retry policy for connect/login attempts.

use std::time::Duration;

/// How many transient failures a connect sequence tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per sequence. Values below 1 count as 1.
    pub budget: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

/// Default attempt budget.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget: DEFAULT_RETRY_BUDGET,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Start attempt number `attempt` (1-based) after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Give up.
    Exhausted,
}

/// Per-sequence failure counter.
#[derive(Debug, Clone)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record one transient failure.
    pub(crate) fn record_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.policy.budget.max(1) {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                attempt: self.failures + 1,
                delay: self.policy.delay,
            }
        }
    }

    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }

    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.budget, 10);
        assert_eq!(policy.delay, Duration::from_millis(500));
    }

    #[test]
    fn test_budget_allows_budget_minus_one_failures() {
        let mut retry = RetryState::new(RetryPolicy::default());
        for n in 1..10 {
            assert_eq!(
                retry.record_failure(),
                RetryDecision::Retry {
                    attempt: n + 1,
                    delay: DEFAULT_RETRY_DELAY
                }
            );
        }
        assert_eq!(retry.record_failure(), RetryDecision::Exhausted);
        assert_eq!(retry.failures(), 10);
    }

    #[test]
    fn test_reset() {
        let mut retry = RetryState::new(RetryPolicy::default());
        retry.record_failure();
        retry.record_failure();
        retry.reset();
        assert_eq!(retry.failures(), 0);
    }

    #[test]
    fn test_zero_budget_means_single_attempt() {
        let mut retry = RetryState::new(RetryPolicy {
            budget: 0,
            delay: Duration::ZERO,
        });
        assert_eq!(retry.record_failure(), RetryDecision::Exhausted);
    }
}
