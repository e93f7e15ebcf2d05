//! Retry and fallback policy for failed steps.
//!
//! Stateless: every decision is an associated function over the step
//! definition and the attempt count. The only async piece is the
//! cancellable backoff wait.

use std::time::Duration;

use runbook_types::workflow::{ErrorStrategy, WorkflowStep};
use tokio_util::sync::CancellationToken;

/// Stateless retry handler for workflow step failures.
pub struct RetryHandler;

impl RetryHandler {
    /// Whether another attempt should follow a failure.
    ///
    /// `retries` counts failures so far, so the first failure is `1`. A
    /// step with `max_retries = n` gets at most `n + 1` attempts.
    pub fn should_retry(step: &WorkflowStep, retries: u32) -> bool {
        step.error_strategy == ErrorStrategy::Retry && retries <= step.max_retries
    }

    /// Delay before the next attempt. Invalid delays collapse to zero.
    pub fn delay(step: &WorkflowStep) -> Duration {
        Duration::try_from_secs_f64(step.retry_delay).unwrap_or(Duration::ZERO)
    }

    /// The fallback action to run once retries are exhausted, if the step
    /// uses the fallback strategy.
    pub fn fallback_action(step: &WorkflowStep) -> Option<&str> {
        match step.error_strategy {
            ErrorStrategy::Fallback => step.fallback_action.as_deref(),
            _ => None,
        }
    }

    /// Per-attempt timeout: the step's own, else `default`. Non-positive or
    /// non-finite values mean no timeout.
    pub fn attempt_timeout(step: &WorkflowStep, default: Option<Duration>) -> Option<Duration> {
        match step.timeout {
            Some(secs) if secs.is_finite() && secs > 0.0 => Duration::try_from_secs_f64(secs).ok(),
            Some(_) => None,
            None => default,
        }
    }

    /// Sleep for `delay` unless `cancel` fires first.
    ///
    /// Returns `true` when the full delay elapsed and `false` when the wait
    /// was cancelled.
    pub async fn wait(delay: Duration, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn step(strategy: ErrorStrategy, max_retries: u32) -> WorkflowStep {
        let mut s = WorkflowStep::new("flaky", "fail");
        s.error_strategy = strategy;
        s.max_retries = max_retries;
        s
    }

    // -------------------------------------------------------------------
    // should_retry
    // -------------------------------------------------------------------

    #[test]
    fn test_should_retry_within_limit() {
        let s = step(ErrorStrategy::Retry, 2);
        assert!(RetryHandler::should_retry(&s, 1));
        assert!(RetryHandler::should_retry(&s, 2));
        assert!(!RetryHandler::should_retry(&s, 3));
    }

    #[test]
    fn test_should_retry_only_for_retry_strategy() {
        for strategy in [ErrorStrategy::Stop, ErrorStrategy::Skip, ErrorStrategy::Fallback] {
            assert!(!RetryHandler::should_retry(&step(strategy, 5), 1));
        }
    }

    #[test]
    fn test_zero_retries_never_retries() {
        assert!(!RetryHandler::should_retry(&step(ErrorStrategy::Retry, 0), 1));
    }

    // -------------------------------------------------------------------
    // delay / timeout / fallback
    // -------------------------------------------------------------------

    #[test]
    fn test_delay_from_seconds() {
        let mut s = step(ErrorStrategy::Retry, 1);
        s.retry_delay = 0.25;
        assert_eq!(RetryHandler::delay(&s), Duration::from_millis(250));
        s.retry_delay = -3.0;
        assert_eq!(RetryHandler::delay(&s), Duration::ZERO);
        s.retry_delay = f64::NAN;
        assert_eq!(RetryHandler::delay(&s), Duration::ZERO);
    }

    #[test]
    fn test_attempt_timeout_prefers_step_value() {
        let default = Some(Duration::from_secs(30));
        let mut s = step(ErrorStrategy::Stop, 0);
        assert_eq!(RetryHandler::attempt_timeout(&s, default), default);
        s.timeout = Some(1.5);
        assert_eq!(
            RetryHandler::attempt_timeout(&s, default),
            Some(Duration::from_millis(1500))
        );
        s.timeout = Some(0.0);
        assert_eq!(RetryHandler::attempt_timeout(&s, default), None);
    }

    #[test]
    fn test_fallback_action_requires_strategy() {
        let mut s = step(ErrorStrategy::Stop, 0);
        s.fallback_action = Some("notify".into());
        assert_eq!(RetryHandler::fallback_action(&s), None);
        s.error_strategy = ErrorStrategy::Fallback;
        assert_eq!(RetryHandler::fallback_action(&s), Some("notify"));
    }

    // -------------------------------------------------------------------
    // wait
    // -------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_wait_elapses() {
        let token = CancellationToken::new();
        assert!(RetryHandler::wait(Duration::from_secs(10), &token).await);
    }

    #[tokio::test]
    async fn test_wait_cancelled_early() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let started = std::time::Instant::now();
        assert!(!RetryHandler::wait(Duration::from_secs(60), &token).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_wait_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!RetryHandler::wait(Duration::from_secs(60), &token).await);
    }
}
