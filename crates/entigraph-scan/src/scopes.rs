use crate::context::ScanContext;
use crate::pager::paged;
use entigraph_core::{ApplicationScope, BranchKey, PageToken, PartitionRange, Result};
use futures::future::FutureExt;
use futures::stream::BoxStream;

/// Lists tenants one ring range at a time.
#[derive(Debug, Clone)]
pub struct TenantEnumerator {
    ctx: ScanContext,
}

impl TenantEnumerator {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Every scope whose root node sits in `range`. Nothing is fetched
    /// until the stream is polled.
    pub fn scopes_in_range(&self, range: PartitionRange) -> BoxStream<'static, Result<ApplicationScope>> {
        self.scopes_in_range_from(range, None)
    }

    /// Resume a range listing after a previously observed token.
    pub fn scopes_in_range_from(
        &self,
        range: PartitionRange,
        token: Option<PageToken>,
    ) -> BoxStream<'static, Result<ApplicationScope>> {
        let store = self.ctx.store.clone();
        paged(
            self.ctx.gate.clone(),
            self.ctx.page_size,
            BranchKey::Partition(range),
            token,
            move |request| {
                let store = store.clone();
                async move { store.page_scopes(&range, request).await }.boxed()
            },
        )
    }
}
