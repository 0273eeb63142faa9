//! Token-driven paging shared by every paged enumerator.

use crate::gate::FetchGate;
use entigraph_core::{BranchKey, Page, PageRequest, PageToken, Result, ScanError, StoreResult};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tracing::{debug, warn};

struct PagerState<F> {
    gate: FetchGate,
    page_size: usize,
    branch: BranchKey,
    fetch: F,
    token: Option<PageToken>,
    done: bool,
}

/// Lazily walk one branch page by page, starting after `start`.
///
/// Ends when the store hands back no next token. A next token equal to the
/// one just sent ends the branch with `PagingStalled`; that page's items are
/// not emitted. A failed page ends the branch with `ScanPageFailed` carrying
/// the token the failed request was sent with.
pub(crate) fn paged<T, F>(
    gate: FetchGate,
    page_size: usize,
    branch: BranchKey,
    start: Option<PageToken>,
    fetch: F,
) -> BoxStream<'static, Result<T>>
where
    T: Send + 'static,
    F: Fn(PageRequest) -> BoxFuture<'static, StoreResult<Page<T>>> + Send + Sync + 'static,
{
    let state = PagerState {
        gate,
        page_size,
        branch,
        fetch,
        token: start,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let request = PageRequest {
            token: state.token.clone(),
            limit: state.page_size,
        };
        let result = {
            let fetch = &state.fetch;
            let request = &request;
            state
                .gate
                .call(&state.branch, move || fetch(request.clone()))
                .await
        };

        let outcome = match result {
            Ok(page) => match (&request.token, page.next_token) {
                (Some(sent), Some(next)) if *sent == next => {
                    warn!(branch = %state.branch, token = %sent, "page token did not advance");
                    state.done = true;
                    Err(ScanError::PagingStalled {
                        branch: state.branch.clone(),
                        token: next,
                    })
                }
                (_, next) => {
                    debug!(
                        branch = %state.branch,
                        items = page.items.len(),
                        last = next.is_none(),
                        "page fetched"
                    );
                    state.done = next.is_none();
                    state.token = next;
                    Ok(page.items)
                }
            },
            Err(source) => {
                state.done = true;
                Err(ScanError::ScanPageFailed {
                    branch: state.branch.clone(),
                    last_token: request.token,
                    source,
                })
            }
        };
        Some((outcome, state))
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}

/// Lazily run one unpaged listing call through the gate and stream its rows.
pub(crate) fn listed<T, F>(gate: FetchGate, branch: BranchKey, fetch: F) -> BoxStream<'static, Result<T>>
where
    T: Send + 'static,
    F: Fn() -> BoxFuture<'static, StoreResult<Vec<T>>> + Send + Sync + 'static,
{
    stream::once(async move {
        gate.call(&branch, &fetch)
            .await
            .map_err(|source| ScanError::ScanPageFailed {
                branch: branch.clone(),
                last_token: None,
                source,
            })
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
