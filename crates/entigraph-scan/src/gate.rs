use crate::retry::RetryPolicy;
use entigraph_core::{StoreError, StoreResult};
use metrics::{counter, histogram};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Throttle in front of the backing store.
///
/// Every store call of a scan goes through one gate. A permit is held for
/// the whole retry loop of a call, so retries reuse the caller's slot and
/// the number of calls in flight never exceeds `max_concurrency`.
#[derive(Debug, Clone)]
pub struct FetchGate {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl FetchGate {
    pub fn new(max_concurrency: usize, retry: RetryPolicy, call_timeout: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            retry,
            call_timeout,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Calls currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.permits.available_permits()
    }

    /// Run `op` under a permit with the per-call timeout, retrying retriable
    /// failures with backoff. Returns the last error once attempts run out
    /// or the error is not retriable.
    pub async fn call<T, F, Fut>(&self, label: &(dyn fmt::Display + Sync), mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = StoreResult<T>> + Send,
        T: Send,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Unavailable("fetch gate closed".to_string()))?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = match timeout(self.call_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };
            histogram!("entigraph_scan_store_call_seconds").record(started.elapsed());

            match result {
                Ok(value) => {
                    counter!("entigraph_scan_pages_fetched").increment(1);
                    if attempt > 1 {
                        debug!(%label, attempt, "store call recovered");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retriable() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    counter!("entigraph_scan_retries").increment(1);
                    warn!(
                        %label,
                        attempt,
                        max_attempts = self.retry.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store call failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    counter!("entigraph_scan_store_failures").increment(1);
                    warn!(%label, attempt, error = %e, "store call failed");
                    return Err(e);
                }
            }
        }
    }
}
