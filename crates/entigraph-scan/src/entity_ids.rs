use crate::context::ScanContext;
use crate::pager::paged;
use entigraph_core::{ApplicationScope, BranchKey, EntityId, PageToken, Result};
use futures::future::FutureExt;
use futures::stream::BoxStream;

/// Pages the ids of one collection. The highest volume layer of a scan.
#[derive(Debug, Clone)]
pub struct EntityIdEnumerator {
    ctx: ScanContext,
}

impl EntityIdEnumerator {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Ids of `entity_type` in `scope`, after `token` when given.
    pub fn ids_of_type(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        token: Option<PageToken>,
    ) -> BoxStream<'static, Result<EntityId>> {
        let store = self.ctx.store.clone();
        let scope = scope.clone();
        let entity_type = entity_type.to_string();
        let branch = BranchKey::Collection {
            scope: scope.clone(),
            entity_type: entity_type.clone(),
        };
        paged(
            self.ctx.gate.clone(),
            self.ctx.page_size,
            branch,
            token,
            move |request| {
                let store = store.clone();
                let scope = scope.clone();
                let entity_type = entity_type.clone();
                async move { store.page_entity_ids(&scope, &entity_type, request).await }.boxed()
            },
        )
    }
}
