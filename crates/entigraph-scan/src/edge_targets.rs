use crate::context::ScanContext;
use crate::pager::paged;
use entigraph_core::{BranchKey, EdgeType, EntityId, PageToken, Result};
use futures::future::FutureExt;
use futures::stream::BoxStream;

/// Pages the targets of one edge type leaving one node, in the store's own
/// order.
#[derive(Debug, Clone)]
pub struct EdgeTargetEnumerator {
    ctx: ScanContext,
}

impl EdgeTargetEnumerator {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    pub fn targets_of(
        &self,
        source: &EntityId,
        edge_type: &EdgeType,
        token: Option<PageToken>,
    ) -> BoxStream<'static, Result<EntityId>> {
        let store = self.ctx.store.clone();
        let node = source.clone();
        let edge_type = edge_type.clone();
        let branch = BranchKey::EdgeTargets {
            source: source.clone(),
            edge_type: edge_type.clone(),
        };
        paged(
            self.ctx.gate.clone(),
            self.ctx.page_size,
            branch,
            token,
            move |request| {
                let store = store.clone();
                let node = node.clone();
                let edge_type = edge_type.clone();
                async move { store.page_edge_targets(&node, &edge_type, request).await }.boxed()
            },
        )
    }
}
