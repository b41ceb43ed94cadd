use std::time::Duration;

use crate::services::backend::BackendError;

/// Backoff settings for transient backend failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive transient failures tolerated before giving up.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Counts consecutive transient failures for one job.
#[derive(Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    consecutive: u32,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Register a transient failure and decide whether to try again.
    pub fn record_failure(&mut self, err: &BackendError) -> RetryDecision {
        self.consecutive += 1;
        if self.consecutive > self.policy.max_retries {
            return RetryDecision::GiveUp {
                attempts: self.consecutive,
            };
        }

        let mut delay = self.policy.delay_for(self.consecutive);
        if let Some(requested) = err.retry_after() {
            delay = delay.max(requested.min(self.policy.max_delay));
        }
        RetryDecision::Retry {
            attempt: self.consecutive,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable(retry_after: Option<Duration>) -> BackendError {
        BackendError::Status {
            status: 503,
            message: "unavailable".to_string(),
            retry_after,
        }
    }

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            max_retries: 5,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let mut retrier = Retrier::new(RetryPolicy::default());
        let err = unavailable(None);
        for attempt in 1..=3 {
            assert!(matches!(
                retrier.record_failure(&err),
                RetryDecision::Retry { attempt: a, .. } if a == attempt
            ));
        }
        assert_eq!(
            retrier.record_failure(&err),
            RetryDecision::GiveUp { attempts: 4 }
        );
    }

    #[test]
    fn test_success_resets_budget() {
        let mut retrier = Retrier::new(RetryPolicy::default());
        let err = unavailable(None);
        retrier.record_failure(&err);
        retrier.record_failure(&err);
        retrier.record_success();
        assert_eq!(retrier.consecutive_failures(), 0);
        assert_eq!(
            retrier.record_failure(&err),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn test_retry_after_extends_delay() {
        let mut retrier = Retrier::new(RetryPolicy::default());
        let decision = retrier.record_failure(&unavailable(Some(Duration::from_secs(7))));
        assert_eq!(
            decision,
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(7)
            }
        );
    }
}
