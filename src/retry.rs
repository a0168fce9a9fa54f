//! Retry policy with escalating timeouts and bounded exponential backoff.
//!
//! A single composable policy (attempt count, timeout schedule, backoff
//! schedule, retryable-kind predicate) replaces ad hoc retry loops. The
//! policy wraps one architect and one prompt; provider fallback is
//! orchestrated one level up by the cycle, not here.
//!
//! Timeout escalation and backoff are independent axes: the attempt index
//! selects the timeout level, while the backoff sleep grows as
//! `2^(attempt-1)` seconds between attempts.

use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::{Architect, ProviderResult};

/// Default per-attempt timeout schedule.
pub const DEFAULT_TIMEOUTS: [Duration; 3] = [
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(300),
];

/// Base backoff delay before the second attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Calculate the backoff delay slept before retry attempt `attempt`
/// (1-indexed: the sleep before attempt 2 uses `attempt = 1`).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use promethean::retry::calculate_backoff;
///
/// assert_eq!(calculate_backoff(1), Duration::from_secs(1));
/// assert_eq!(calculate_backoff(2), Duration::from_secs(2));
/// assert_eq!(calculate_backoff(3), Duration::from_secs(4));
/// ```
#[must_use]
pub fn calculate_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    BACKOFF_BASE.saturating_mul(2u32.saturating_pow(exponent))
}

/// Retry policy for architect calls.
///
/// # Example
///
/// ```rust,ignore
/// use promethean::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// let result = policy.call(architect.as_ref(), &prompt).await;
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per call.
    max_attempts: u32,
    /// Per-attempt timeouts; the last level is reused if attempts exceed it.
    timeouts: Vec<Duration>,
    /// Whether to actually sleep between attempts (disabled in tests).
    sleep_between_attempts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeouts: DEFAULT_TIMEOUTS.to_vec(),
            sleep_between_attempts: true,
        }
    }
}

impl RetryPolicy {
    /// Create the default policy: 3 attempts, 60s/120s/300s timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    /// Override the timeout schedule. Must be non-empty.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Vec<Duration>) -> Self {
        if !timeouts.is_empty() {
            self.timeouts = timeouts;
        }
        self
    }

    /// Disable backoff sleeps (test builds).
    #[must_use]
    pub fn without_sleep(mut self) -> Self {
        self.sleep_between_attempts = false;
        self
    }

    /// The timeout used for a given 1-indexed attempt.
    ///
    /// Attempts beyond the schedule reuse the last level; escalation never
    /// exceeds it.
    #[must_use]
    pub fn timeout_for_attempt(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1) as usize).min(self.timeouts.len() - 1);
        self.timeouts[index]
    }

    /// Call the architect with up to `max_attempts` attempts.
    ///
    /// Semantics:
    /// - any `Success` returns immediately;
    /// - a `permanent` failure kind returns immediately without consuming
    ///   remaining attempts;
    /// - a `transient` failure sleeps the backoff delay and retries with
    ///   the next timeout level;
    /// - if the final attempt fails, the last `Failure` is returned.
    pub async fn call(&self, architect: &dyn Architect, prompt: &str) -> ProviderResult {
        let mut last_result = None;

        for attempt in 1..=self.max_attempts {
            let timeout = self.timeout_for_attempt(attempt);

            if attempt > 1 && self.sleep_between_attempts {
                let backoff = calculate_backoff(attempt - 1);
                debug!(
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    "backing off before retry"
                );
                tokio::time::sleep(backoff).await;
            }

            let result = architect.invoke(prompt, timeout).await;

            match &result {
                ProviderResult::Success { latency, .. } => {
                    debug!(
                        architect = %architect.id(),
                        attempt,
                        timeout_secs = timeout.as_secs(),
                        latency_ms = latency.as_millis() as u64,
                        "architect call succeeded"
                    );
                    return result;
                }
                ProviderResult::Failure {
                    kind,
                    message,
                    latency,
                } => {
                    warn!(
                        architect = %architect.id(),
                        attempt,
                        %kind,
                        timeout_secs = timeout.as_secs(),
                        latency_ms = latency.as_millis() as u64,
                        message = message.as_str(),
                        "architect call failed"
                    );
                    if kind.is_permanent() {
                        return result;
                    }
                    last_result = Some(result);
                }
            }
        }

        last_result.unwrap_or(ProviderResult::Failure {
            kind: crate::provider::ErrorKind::Unknown,
            message: "retry policy invoked with zero attempts".to_string(),
            latency: Duration::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ArchitectId, ErrorKind, MockArchitect, MockOutcome};

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(calculate_backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_escalation_levels() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.timeout_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.timeout_for_attempt(2), Duration::from_secs(120));
        assert_eq!(policy.timeout_for_attempt(3), Duration::from_secs(300));
        // Never exceeds the last level
        assert_eq!(policy.timeout_for_attempt(9), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_transient_failures_use_full_schedule() {
        let mock = MockArchitect::failing(ArchitectId::Claude, ErrorKind::Timeout, "timed out");
        let policy = RetryPolicy::default().without_sleep();

        let result = policy.call(&mock, "prompt").await;

        assert_eq!(result.failure_kind(), Some(ErrorKind::Timeout));
        assert_eq!(mock.call_count(), 3);
        assert_eq!(
            mock.timeouts_used(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(300)
            ]
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_single_attempt() {
        for kind in [
            ErrorKind::QuotaExceeded,
            ErrorKind::UsageLimit,
            ErrorKind::ApiKeyInvalid,
        ] {
            let mock = MockArchitect::failing(ArchitectId::Claude, kind, "nope");
            let policy = RetryPolicy::default().without_sleep();

            let result = policy.call(&mock, "prompt").await;

            assert_eq!(result.failure_kind(), Some(kind));
            assert_eq!(mock.call_count(), 1, "kind {kind} must not retry");
        }
    }

    #[tokio::test]
    async fn test_success_returns_immediately() {
        let mock = MockArchitect::always(ArchitectId::Claude, "done");
        let policy = RetryPolicy::default().without_sleep();

        let result = policy.call(&mock, "prompt").await;

        assert!(result.is_success());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_then_success_on_second_attempt() {
        let mock = MockArchitect::new(
            ArchitectId::Claude,
            vec![
                MockOutcome::Fail(ErrorKind::Timeout, "timed out after 60s".into()),
                MockOutcome::Reply("second try worked".into()),
            ],
        );
        let policy = RetryPolicy::default().without_sleep();

        let result = policy.call(&mock, "prompt").await;

        assert!(result.is_success());
        assert_eq!(mock.call_count(), 2);
        assert_eq!(
            mock.timeouts_used(),
            vec![Duration::from_secs(60), Duration::from_secs(120)]
        );
    }

    #[tokio::test]
    async fn test_unknown_kind_bounded_by_attempt_budget() {
        let mock = MockArchitect::failing(ArchitectId::Gemini, ErrorKind::Unknown, "???");
        let policy = RetryPolicy::default().without_sleep();

        let result = policy.call(&mock, "prompt").await;

        assert_eq!(result.failure_kind(), Some(ErrorKind::Unknown));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_custom_attempt_budget() {
        let mock = MockArchitect::failing(ArchitectId::Claude, ErrorKind::ConnectionError, "down");
        let policy = RetryPolicy::default().with_max_attempts(2).without_sleep();

        policy.call(&mock, "prompt").await;
        assert_eq!(mock.call_count(), 2);
    }
}
