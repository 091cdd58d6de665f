//! Retry schedule for nodes with `on_error: retry`.
//!
//! The first execution is attempt 1. Retry `n` (1-based) waits
//! `delay * 2^(n-1)` seconds, so a policy of `{max_retries: 3, delay: 1}`
//! sleeps 1s, 2s, then 4s.

use std::time::Duration;

use dagflow_types::workflow::RetryPolicy;

/// Doubling stops growing past this exponent.
const MAX_BACKOFF_EXPONENT: u32 = 30;

// ---------------------------------------------------------------------------
// RetryHandler
// ---------------------------------------------------------------------------

/// Stateless back-off calculations.
pub struct RetryHandler;

impl RetryHandler {
    /// Total executions allowed: the first attempt plus `max_retries`.
    pub fn max_attempts(policy: &RetryPolicy) -> u32 {
        policy.max_retries.saturating_add(1)
    }

    /// Whether another attempt may follow `attempt` (1-based).
    pub fn should_retry(policy: &RetryPolicy, attempt: u32) -> bool {
        attempt < Self::max_attempts(policy)
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let secs = policy.delay * f64::from(1u32 << exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, delay: f64) -> RetryPolicy {
        RetryPolicy { max_retries, delay }
    }

    #[test]
    fn test_attempt_budget() {
        let p = policy(3, 1.0);
        assert_eq!(RetryHandler::max_attempts(&p), 4);
        assert!(RetryHandler::should_retry(&p, 1));
        assert!(RetryHandler::should_retry(&p, 3));
        assert!(!RetryHandler::should_retry(&p, 4));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let p = policy(0, 1.0);
        assert!(!RetryHandler::should_retry(&p, 1));
    }

    #[test]
    fn test_exponential_backoff() {
        let p = policy(3, 0.5);
        assert_eq!(RetryHandler::backoff_delay(&p, 1), Duration::from_millis(500));
        assert_eq!(RetryHandler::backoff_delay(&p, 2), Duration::from_secs(1));
        assert_eq!(RetryHandler::backoff_delay(&p, 3), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_delay_is_zero() {
        assert_eq!(RetryHandler::backoff_delay(&policy(1, -1.0), 1), Duration::ZERO);
        assert_eq!(RetryHandler::backoff_delay(&policy(1, f64::NAN), 1), Duration::ZERO);
    }
}
