use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Bounds for calling one external provider
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    /// Upper bound for a single attempt, after which it is abandoned
    pub timeout: Duration,
    /// Maximum number of attempts (including the first one), at least 1
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
}

impl AttemptPolicy {
    /// Create a policy; `max_attempts` of 0 is treated as 1
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }

    /// Set the delay before the first retry
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Preset: geolocation lookups (one 3s attempt per provider)
    pub fn geo_lookup() -> Self {
        Self::new(Duration::from_secs(3), 1)
    }

    /// Preset: IP-only lookups (one 2s attempt per provider)
    pub fn ip_lookup() -> Self {
        Self::new(Duration::from_secs(2), 1)
    }

    /// Worst-case time spent on one provider, waits included
    pub fn worst_case(&self) -> Duration {
        (0..self.max_attempts)
            .map(|attempt| self.timeout + self.delay_for_attempt(attempt))
            .sum()
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self::geo_lookup()
    }
}

/// Why a bounded attempt did not produce a value
#[derive(Debug)]
pub enum AttemptError<E> {
    /// The attempt did not finish within the policy timeout
    TimedOut(Duration),
    /// The operation itself failed
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(limit) => write!(f, "timed out after {:?}", limit),
            AttemptError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AttemptError<E> {}

/// Run one attempt of `operation`, abandoning it once `limit` elapses
pub async fn with_timeout<T, E, Fut>(limit: Duration, operation: Fut) -> Result<T, AttemptError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match timeout(limit, operation).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AttemptError::Failed(e)),
        Err(_) => Err(AttemptError::TimedOut(limit)),
    }
}

/// Execute an async operation with a per-attempt timeout and bounded retries
///
/// `should_retry` decides whether a failure is worth another attempt; timeouts
/// are passed to it as well. Returns the last error once attempts run out.
pub async fn with_timeout_retry_if<T, E, F, Fut, P>(
    policy: &AttemptPolicy,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, AttemptError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: Fn(&AttemptError<E>) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        // Wait before retry (except for first attempt)
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                max_attempts,
                delay
            );
            sleep(delay).await;
        }

        match with_timeout(policy.timeout, operation()).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    debug!(
                        "{}: Error is not retryable, failing immediately: {}",
                        operation_name, e
                    );
                    return Err(e);
                }

                let remaining = max_attempts - attempt - 1;
                if remaining == 0 {
                    if max_attempts > 1 {
                        warn!(
                            "{}: All {} attempts failed. Last error: {}",
                            operation_name, max_attempts, e
                        );
                    }
                    return Err(e);
                }

                warn!(
                    "{}: Attempt {}/{} failed ({}), {} retries remaining",
                    operation_name,
                    attempt + 1,
                    max_attempts,
                    e,
                    remaining
                );
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> AttemptPolicy {
        AttemptPolicy::new(Duration::from_millis(200), max_attempts)
            .with_initial_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_millis(20))
    }

    #[test]
    fn test_policy_presets() {
        let geo = AttemptPolicy::geo_lookup();
        assert_eq!(geo.timeout, Duration::from_secs(3));
        assert_eq!(geo.max_attempts, 1);

        let ip = AttemptPolicy::ip_lookup();
        assert_eq!(ip.timeout, Duration::from_secs(2));
        assert_eq!(ip.max_attempts, 1);
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = AttemptPolicy::new(Duration::from_secs(1), 0);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_delay_calculation() {
        let policy = AttemptPolicy::new(Duration::from_secs(1), 4)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(30));

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max() {
        let policy = AttemptPolicy::new(Duration::from_secs(1), 10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(3));

        // Attempt 4 would be 8 seconds, but max is 3
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(3));
    }

    #[test]
    fn test_worst_case_is_finite_and_bounded() {
        let policy = AttemptPolicy::new(Duration::from_secs(2), 3)
            .with_initial_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(1));

        // 3 attempts of 2s plus waits of 500ms and 1s
        assert_eq!(policy.worst_case(), Duration::from_millis(7500));
    }

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result: Result<u32, AttemptError<&str>> =
            with_timeout(Duration::from_millis(100), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let limit = Duration::from_millis(20);
        let result: Result<u32, AttemptError<&str>> = with_timeout(limit, async {
            sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;

        assert!(matches!(result, Err(AttemptError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_failure_is_wrapped() {
        let result: Result<u32, AttemptError<&str>> =
            with_timeout(Duration::from_millis(100), async { Err("boom") }).await;

        match result {
            Err(AttemptError::Failed(e)) => assert_eq!(e, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, AttemptError<&str>> = with_timeout_retry_if(
            &fast_policy(3),
            "test",
            || {
                let c = counter_clone.clone();
                async move {
                    let attempt = c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 2 {
                        Err("temporary failure")
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_single_attempt_by_default() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, AttemptError<&str>> = with_timeout_retry_if(
            &fast_policy(1),
            "test",
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("unreachable")
                }
            },
            |_| true,
        )
        .await;

        assert!(matches!(result, Err(AttemptError::Failed("unreachable"))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<u32, AttemptError<&str>> = with_timeout_retry_if(
            &fast_policy(3),
            "test",
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("client error 404")
                }
            },
            |e| !matches!(e, AttemptError::Failed(msg) if msg.contains("404")),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_after_timeout() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let policy = AttemptPolicy::new(Duration::from_millis(20), 2)
            .with_initial_delay(Duration::from_millis(1));

        let result: Result<u32, AttemptError<&str>> = with_timeout_retry_if(
            &policy,
            "test",
            || {
                let c = counter_clone.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        sleep(Duration::from_secs(5)).await;
                    }
                    Ok(9)
                }
            },
            |e| matches!(e, AttemptError::TimedOut(_)),
        )
        .await;

        assert_eq!(result.unwrap(), 9);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attempt_error_display() {
        let timed_out: AttemptError<&str> = AttemptError::TimedOut(Duration::from_secs(3));
        assert_eq!(timed_out.to_string(), "timed out after 3s");

        let failed: AttemptError<&str> = AttemptError::Failed("status 503");
        assert_eq!(failed.to_string(), "status 503");
    }
}
