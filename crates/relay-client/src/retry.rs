//! Retry with linear backoff

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Run `op` until it succeeds or retries run out. Quota failures are
    /// returned immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_quota_exceeded() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    warn!("Attempt {} failed: {}", attempt, e);
                    if attempt > self.max_retries {
                        return Err(e);
                    }
                    tokio::time::sleep(self.base_delay * attempt).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_recovers_on_second_attempt() {
        let calls = &AtomicU32::new(0);
        let result = fast(1)
            .run(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ClientError::Transport("reset".into()))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = &AtomicU32::new(0);
        let err = fast(2)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ClientError::Gateway {
                    status: 500,
                    body: format!("try {}", calls.load(Ordering::SeqCst)),
                })
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "AI Engine Error: 500 - try 3");
    }

    #[tokio::test]
    async fn test_quota_error_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = fast(3)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ClientError::QuotaExceeded("full".into()))
            })
            .await
            .unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_is_linear() {
        let policy = RetryPolicy::new(2, Duration::from_millis(20));
        let start = std::time::Instant::now();
        let _ = policy
            .run(|| async { Err::<(), _>(ClientError::Transport("down".into())) })
            .await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
