//! Bounded retry of transient network failures.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::{DeployError, RpcError};

/// How transient failures before submission are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }

    /// Run `operation`, retrying while it fails with a transient [`RpcError`].
    ///
    /// Exhausted retries surface as [`DeployError::Network`]; any other error
    /// is returned at once as [`DeployError::Rpc`].
    pub async fn run<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let attempts = AtomicUsize::new(1);

        f.retry(self.backoff())
            .when(RpcError::is_transient)
            .notify(|err: &RpcError, delay: Duration| {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    operation,
                    attempt,
                    error = %err,
                    retry_in = ?delay,
                    "Transient network error, retrying..."
                );
            })
            .await
            .map_err(|source| {
                if source.is_transient() {
                    DeployError::Network {
                        operation: operation.to_string(),
                        attempts: attempts.load(Ordering::Relaxed),
                        source,
                    }
                } else {
                    DeployError::Rpc {
                        operation: operation.to_string(),
                        source,
                    }
                }
            })
    }
}
