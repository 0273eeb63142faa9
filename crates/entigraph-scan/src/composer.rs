//! Bounded fan-in of independently paged branches into one stream.

use entigraph_core::{BranchFailure, BranchKey, FailureMode, Result, ScanConfig, ScanError};
use futures::stream::{BoxStream, FuturesUnordered, Stream, StreamExt};
use metrics::counter;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One unit of concurrent work: a lazily enumerated inner stream and the
/// key its failures are reported under.
pub struct Branch<T> {
    pub key: BranchKey,
    pub items: BoxStream<'static, Result<T>>,
}

impl<T> Branch<T> {
    pub fn new(key: BranchKey, items: BoxStream<'static, Result<T>>) -> Self {
        Self { key, items }
    }
}

enum ScanEvent<T> {
    Item(T),
    Skipped(BranchFailure),
    Failed(ScanError),
    Completed,
}

/// Drives a stream of branches with at most `max_concurrency` of them
/// active at once.
#[derive(Debug, Clone, Copy)]
pub struct StreamComposer {
    max_concurrency: usize,
    failure_mode: FailureMode,
}

impl StreamComposer {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency.max(1),
            failure_mode: config.failure_mode,
        }
    }

    /// Spawn the driver for `outer` and hand back the merged stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn compose<T>(&self, outer: BoxStream<'static, Result<Branch<T>>>) -> ScanStream<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.max_concurrency);
        let cancel = CancellationToken::new();
        let driver = Driver {
            tx,
            cancel: cancel.clone(),
            max_concurrency: self.max_concurrency,
            failure_mode: self.failure_mode,
        };
        tokio::spawn(driver.run(outer));
        ScanStream::new(rx, cancel)
    }
}

struct Driver<T> {
    tx: mpsc::Sender<ScanEvent<T>>,
    cancel: CancellationToken,
    max_concurrency: usize,
    failure_mode: FailureMode,
}

enum Flow {
    Continue,
    Stop,
}

impl<T: Send + 'static> Driver<T> {
    async fn run(self, mut outer: BoxStream<'static, Result<Branch<T>>>) {
        let started = Instant::now();
        let mut in_flight = FuturesUnordered::new();
        let mut outer_done = false;
        let mut branches = 0usize;
        let mut emitted = 0usize;
        let mut skipped = 0usize;

        loop {
            if outer_done && in_flight.is_empty() {
                break;
            }
            let can_pull = !outer_done && in_flight.len() < self.max_concurrency;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!(branches, emitted, in_flight = in_flight.len(), "scan cancelled");
                    return;
                }

                next = outer.next(), if can_pull => match next {
                    Some(Ok(branch)) => {
                        branches += 1;
                        debug!(branch = %branch.key, "branch started");
                        in_flight.push(drain(branch, self.tx.clone()));
                    }
                    Some(Err(error)) => {
                        skipped += 1;
                        if let Flow::Stop = self.on_failure(error).await {
                            return;
                        }
                    }
                    None => outer_done = true,
                },

                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => match outcome {
                    Ok(count) => emitted += count,
                    Err((count, failure)) => {
                        emitted += count;
                        skipped += 1;
                        if let Flow::Stop = self.on_branch_failure(failure).await {
                            return;
                        }
                    }
                },
            }
        }

        info!(
            branches,
            emitted,
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan completed"
        );
        self.emit(ScanEvent::Completed).await;
    }

    async fn on_failure(&self, error: ScanError) -> Flow {
        match error.branch().cloned() {
            Some(branch) => self.on_branch_failure(BranchFailure { branch, error }).await,
            None => {
                self.emit(ScanEvent::Failed(error)).await;
                Flow::Stop
            }
        }
    }

    async fn on_branch_failure(&self, failure: BranchFailure) -> Flow {
        counter!("entigraph_scan_branches_failed").increment(1);
        match self.failure_mode {
            FailureMode::FailFast => {
                warn!(branch = %failure.branch, error = %failure.error, "branch failed, stopping scan");
                self.emit(ScanEvent::Failed(failure.error)).await;
                Flow::Stop
            }
            FailureMode::BestEffort => {
                warn!(branch = %failure.branch, error = %failure.error, "branch failed, skipping");
                if self.emit(ScanEvent::Skipped(failure)).await {
                    Flow::Continue
                } else {
                    Flow::Stop
                }
            }
        }
    }

    /// Deliver a driver-level event unless the scan is cancelled first.
    async fn emit(&self, event: ScanEvent<T>) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}

/// Forward every item of one branch, returning how many were delivered.
async fn drain<T>(
    branch: Branch<T>,
    tx: mpsc::Sender<ScanEvent<T>>,
) -> std::result::Result<usize, (usize, BranchFailure)> {
    let Branch { key, mut items } = branch;
    let mut delivered = 0usize;
    while let Some(next) = items.next().await {
        match next {
            Ok(item) => {
                if tx.send(ScanEvent::Item(item)).await.is_err() {
                    break;
                }
                delivered += 1;
                counter!("entigraph_scan_items_emitted").increment(1);
            }
            Err(error) => {
                return Err((
                    delivered,
                    BranchFailure {
                        branch: key,
                        error,
                    },
                ))
            }
        }
    }
    debug!(branch = %key, delivered, "branch exhausted");
    Ok(delivered)
}

/// Everything a drained scan produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport<T> {
    pub items: Vec<T>,
    /// Branches abandoned in best-effort mode.
    pub skipped: Vec<BranchFailure>,
    pub cancelled: bool,
}

impl<T> ScanReport<T> {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && !self.cancelled
    }
}

/// Consumer side of a running scan.
///
/// Yields items until the scan ends. The last element tells how it ended:
/// nothing more on success, `Cancelled` after [`ScanStream::cancel`],
/// `Incomplete` when best-effort mode skipped branches, or the first branch
/// error in fail-fast mode. Dropping the stream cancels the scan.
pub struct ScanStream<T> {
    rx: mpsc::Receiver<ScanEvent<T>>,
    cancel: CancellationToken,
    skipped: Vec<BranchFailure>,
    finished: bool,
}

impl<T> Unpin for ScanStream<T> {}

impl<T> ScanStream<T> {
    fn new(rx: mpsc::Receiver<ScanEvent<T>>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            skipped: Vec::new(),
            finished: false,
        }
    }

    /// Stop scheduling new pages and abandon the ones in flight. The next
    /// poll yields `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this scan from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Branches skipped so far in best-effort mode.
    pub fn skipped_branches(&self) -> &[BranchFailure] {
        &self.skipped
    }

    /// Drain the scan into a report. Fail-fast errors are returned as is.
    pub async fn into_report(mut self) -> Result<ScanReport<T>> {
        let mut items = Vec::new();
        let mut cancelled = false;
        while let Some(next) = self.next().await {
            match next {
                Ok(item) => items.push(item),
                Err(ScanError::Incomplete { .. }) => break,
                Err(ScanError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ScanReport {
            items,
            skipped: std::mem::take(&mut self.skipped),
            cancelled,
        })
    }

    fn finish(&mut self) {
        self.finished = true;
        self.rx.close();
    }
}

impl<T> Stream for ScanStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if this.cancel.is_cancelled() {
            this.finish();
            return Poll::Ready(Some(Err(ScanError::Cancelled)));
        }

        loop {
            let event = match this.rx.poll_recv(cx) {
                Poll::Ready(event) => event,
                Poll::Pending => return Poll::Pending,
            };
            match event {
                Some(ScanEvent::Item(item)) => return Poll::Ready(Some(Ok(item))),
                Some(ScanEvent::Skipped(failure)) => this.skipped.push(failure),
                Some(ScanEvent::Failed(error)) => {
                    this.finish();
                    return Poll::Ready(Some(Err(error)));
                }
                Some(ScanEvent::Completed) => {
                    this.finish();
                    if this.skipped.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(ScanError::Incomplete {
                        failures: this.skipped.clone(),
                    })));
                }
                None => {
                    this.finish();
                    let error = if this.cancel.is_cancelled() {
                        ScanError::Cancelled
                    } else {
                        ScanError::Aborted("scan driver stopped before completing".to_string())
                    };
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }
    }
}

impl<T> Drop for ScanStream<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
