use crate::context::ScanContext;
use crate::pager::listed;
use entigraph_core::{BranchKey, EdgeType, EntityId, Result};
use futures::future::FutureExt;
use futures::stream::BoxStream;

#[derive(Debug, Clone)]
pub struct EdgeTypeEnumerator {
    ctx: ScanContext,
}

impl EdgeTypeEnumerator {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Distinct outgoing edge types of `source`. Empty when it has none.
    pub fn edge_types_from(&self, source: &EntityId) -> BoxStream<'static, Result<EdgeType>> {
        let store = self.ctx.store.clone();
        let node = source.clone();
        listed(
            self.ctx.gate.clone(),
            BranchKey::EdgeTypes {
                source: source.clone(),
            },
            move || {
                let store = store.clone();
                let node = node.clone();
                async move { store.page_edge_types(&node).await }.boxed()
            },
        )
    }
}
