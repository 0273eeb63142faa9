use crate::context::ScanContext;
use crate::pager::listed;
use entigraph_core::{ApplicationScope, BranchKey, Result};
use futures::future::FutureExt;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};

/// Lists the collections of a tenant.
///
/// Members of a collection hang off the tenant root by an edge named after
/// the collection, so the collection types are the root's edge types.
#[derive(Debug, Clone)]
pub struct CollectionTypeEnumerator {
    ctx: ScanContext,
}

impl CollectionTypeEnumerator {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    pub fn types_in_scope(&self, scope: &ApplicationScope) -> BoxStream<'static, Result<String>> {
        let store = self.ctx.store.clone();
        let root = scope.root().clone();
        listed(
            self.ctx.gate.clone(),
            BranchKey::Scope(scope.clone()),
            move || {
                let store = store.clone();
                let root = root.clone();
                async move { store.page_edge_types(&root).await }.boxed()
            },
        )
        .map_ok(|edge_type| edge_type.into_inner())
        .boxed()
    }
}
