//! Shared bounded-retry helper (§5 Rust mapping). Used for meter reads,
//! charger commands, and tariff queries — a hand-rolled helper rather than a
//! crate dependency, since callers need to decide per-error whether a
//! failure aborts the tick or merely degrades, a distinction no generic
//! retry crate encodes.

use std::future::Future;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_backoff: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: StdDuration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub async fn run<T, F, Fut>(&self, mut f: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(err) if attempt >= self.attempts => return Err(err),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "retrying after transient failure");
                    tokio::time::sleep(self.base_backoff * attempt).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let policy = RetryPolicy {
            attempts: 3,
            base_backoff: StdDuration::from_millis(1),
        };
        let result = policy.run(|| async { Ok::<_, anyhow::Error>(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            base_backoff: StdDuration::from_millis(1),
        };
        let result = policy
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    anyhow::bail!("not yet")
                }
                Ok::<_, anyhow::Error>(7)
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_configured_attempts() {
        let policy = RetryPolicy {
            attempts: 2,
            base_backoff: StdDuration::from_millis(1),
        };
        let result: anyhow::Result<()> = policy.run(|| async { anyhow::bail!("always fails") }).await;
        assert!(result.is_err());
    }
}
