use crate::error::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

/// Attempt budget and backoff for one logical request.
///
/// The delay before retry `n` (0-based) is `base_delay * 2^n`, so the default
/// of three attempts waits 1s and then 2s before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no sleeping.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delays between attempts, one fewer than `max_attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        // ExponentialBackoff yields 2ms, 4ms, ...; each step scales base_delay.
        let base_delay = self.base_delay;
        ExponentialBackoff::from_millis(2)
            .take(self.max_attempts.saturating_sub(1))
            .map(move |step| {
                let multiple = u32::try_from(step.as_millis()).unwrap_or(u32::MAX);
                base_delay.saturating_mul(multiple) / 2
            })
    }

    /// Runs `action` until it succeeds, fails with a non-transient error, or
    /// the attempt budget is spent. The last error is returned.
    pub async fn run<T, A, Fut>(&self, what: &str, mut action: A) -> Result<T, FetchError>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0usize;
        let max_attempts = self.max_attempts;
        RetryIf::spawn(
            self.delays(),
            || {
                attempt += 1;
                let current = attempt;
                let fut = action();
                async move {
                    let result = fut.await;
                    if let Err(e) = &result {
                        warn!("{} attempt {}/{} failed: {}", what, current, max_attempts, e);
                    }
                    result
                }
            },
            |e: &FetchError| e.is_transient(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn default_backoff_doubles_from_one_second() {
        let delays: Vec<_> = RetryPolicy::default().delays().collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
    }

    #[test]
    fn sub_millisecond_steps_are_not_lost() {
        let delays: Vec<_> = RetryPolicy::new(3, Duration::from_millis(1)).delays().collect();
        assert_eq!(delays, vec![Duration::from_millis(1), Duration::from_millis(2)]);

        let delays: Vec<_> = RetryPolicy::new(4, Duration::from_millis(3)).delays().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(3),
                Duration::from_millis(6),
                Duration::from_millis(12)
            ]
        );
    }

    #[test]
    fn single_attempt_has_no_delays() {
        assert_eq!(RetryPolicy::none().delays().count(), 0);
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Timeout(Duration::from_secs(30)))
                }
            })
            .await;

        assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(30))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn api_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = RetryPolicy::default()
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(FetchError::Api("execution reverted".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Api(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_a_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = RetryPolicy::default()
            .run("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FetchError::Transport("connection reset".into()))
                    } else {
                        Ok(42u64)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
