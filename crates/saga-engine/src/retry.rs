//! # Retry Policy
//!
//! Exponential-backoff retry configuration applied per activity. The engine
//! retries an attempt that failed with a retryable error until the policy's
//! attempt cap or the activity's schedule-to-close deadline is reached.

use std::time::Duration;

/// Retry policy for activity execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_coefficient: f64,
    /// Upper bound for any single delay.
    pub maximum_interval: Duration,
    /// Total number of attempts, including the first one.
    pub maximum_attempts: u32,
    /// Error type names that must never be retried.
    pub non_retryable_error_types: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(10),
            maximum_attempts: 5,
            non_retryable_error_types: Vec::new(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that runs exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = interval;
        self
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    pub fn with_non_retryable_error_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retryable_error_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Delay before the retry following the given 1-based failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_coefficient
            .powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial_interval.as_millis() as f64 * factor)
            .min(self.maximum_interval.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    /// Whether the given error type name is listed as non-retryable.
    pub fn is_non_retryable(&self, error_type: &str) -> bool {
        self.non_retryable_error_types
            .iter()
            .any(|listed| listed == error_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn delay_is_capped_at_maximum_interval() {
        let policy = RetryPolicy::default().with_maximum_interval(Duration::from_secs(3));

        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(3000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(3000));
    }

    #[test]
    fn non_retryable_list_matches_exact_names() {
        let policy = RetryPolicy::default()
            .with_non_retryable_error_types(["CompensationCompleted", "UserIsBlocked"]);

        assert!(policy.is_non_retryable("UserIsBlocked"));
        assert!(policy.is_non_retryable("CompensationCompleted"));
        assert!(!policy.is_non_retryable("InsufficientFunds"));
    }

    #[test]
    fn no_retry_runs_single_attempt() {
        assert_eq!(RetryPolicy::no_retry().maximum_attempts, 1);
    }
}
