//! Bounded retry policy around RPC calls.
//!
//! Every RPC read goes through [`Resilience::fetch`]: one attempt, and on
//! failure exactly one more after [`RETRY_DELAY`]. Each attempt is capped
//! by [`REQUEST_TIMEOUT`]; a timeout counts as a failed attempt.

use std::future::Future;
use std::time::Duration;

use ccip_cache::{ChainId, Error, RpcOperation};

/// Pause before the single retry.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-attempt timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry policy shared by the scanner and the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resilience {
    retry_delay: Duration,
    request_timeout: Duration,
}

impl Default for Resilience {
    fn default() -> Self {
        Self::new(RETRY_DELAY, REQUEST_TIMEOUT)
    }
}

impl Resilience {
    /// Policy with a custom delay and per-attempt timeout.
    #[must_use]
    pub const fn new(retry_delay: Duration, request_timeout: Duration) -> Self {
        Self {
            retry_delay,
            request_timeout,
        }
    }

    /// Run one attempt. Faults are logged and turned into `None`.
    pub async fn call<T, Fut>(
        &self,
        chain_id: ChainId,
        operation: RpcOperation,
        call: Fut,
    ) -> Option<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                tracing::warn!(%chain_id, %operation, error = %e, "RPC call failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    %chain_id,
                    %operation,
                    timeout = ?self.request_timeout,
                    "RPC call timed out"
                );
                None
            }
        }
    }

    /// Run `call` once, and once more after the retry delay if it failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RpcUnavailable`] naming `operation` if both
    /// attempts fail.
    pub async fn fetch<T, F, Fut>(
        &self,
        chain_id: ChainId,
        operation: RpcOperation,
        mut call: F,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(value) = self.call(chain_id, operation, call()).await {
            return Ok(value);
        }

        tracing::debug!(%chain_id, %operation, delay = ?self.retry_delay, "retrying RPC call");
        tokio::time::sleep(self.retry_delay).await;

        self.call(chain_id, operation, call())
            .await
            .ok_or(Error::RpcUnavailable {
                chain_id,
                operation,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;
    use tokio::time::Instant;

    use super::*;

    const CHAIN: ChainId = ChainId::new(1);

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_one_delayed_retry() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let value = Resilience::default()
            .fetch(CHAIN, RpcOperation::BlockNumber, || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(anyhow!("connection reset"))
                    } else {
                        Ok(42u64)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42, "second attempt result");
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "exactly one retry");
        assert_eq!(started.elapsed(), RETRY_DELAY, "exactly one retry delay");
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_wait() {
        let started = Instant::now();
        let value = Resilience::default()
            .fetch(CHAIN, RpcOperation::Block, || async { Ok("block") })
            .await
            .unwrap();
        assert_eq!(value, "block", "first attempt result");
        assert_eq!(started.elapsed(), Duration::ZERO, "no delay on success");
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_two_attempts() {
        let attempts = AtomicU32::new(0);

        let err = Resilience::default()
            .fetch(CHAIN, RpcOperation::FilterLogs, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(anyhow!("rate limited")) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 2, "two attempts in total");
        assert!(
            matches!(
                err,
                Error::RpcUnavailable {
                    operation: RpcOperation::FilterLogs,
                    ..
                }
            ),
            "got {err:?}"
        );
        assert_eq!(err.to_string(), "chain 1: cannot fetch filter logs", "message");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_calls_count_as_failures() {
        let started = Instant::now();
        let policy = Resilience::new(RETRY_DELAY, Duration::from_secs(5));

        let err = policy
            .fetch(CHAIN, RpcOperation::Transaction, || {
                std::future::pending::<anyhow::Result<()>>()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RpcUnavailable { .. }), "got {err:?}");
        assert_eq!(
            started.elapsed(),
            Duration::from_secs(11),
            "two timeouts plus one retry delay"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn default_policy_caps_each_attempt_at_thirty_seconds() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let value = Resilience::default()
            .fetch(CHAIN, RpcOperation::BlockNumber, || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        std::future::pending::<()>().await;
                    }
                    Ok(7u64)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7, "retry after a timeout succeeds");
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "timeout consumed the first attempt");
        assert_eq!(
            started.elapsed(),
            Duration::from_secs(30) + Duration::from_secs(1),
            "one 30 s timeout plus the retry delay"
        );
    }
}
