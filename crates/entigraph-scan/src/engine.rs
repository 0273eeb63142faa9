use crate::collection_types::CollectionTypeEnumerator;
use crate::composer::{Branch, ScanStream, StreamComposer};
use crate::context::ScanContext;
use crate::edge_targets::EdgeTargetEnumerator;
use crate::edge_types::EdgeTypeEnumerator;
use crate::entity_ids::EntityIdEnumerator;
use crate::scopes::TenantEnumerator;
use crate::token_source::PartitionTokenSource;
use entigraph_core::{
    ApplicationScope, BranchKey, EdgeType, EntityId, EntityRecord, Result, ScanConfig, ScanStore,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::info;

/// Entry point for full-system scans over one store.
///
/// Every scan call gets its own fetch gate, so `max_concurrency` bounds the
/// store calls of that scan across all of its layers.
#[derive(Clone)]
pub struct ScanEngine {
    store: Arc<dyn ScanStore>,
}

impl ScanEngine {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self { store }
    }

    fn context(&self, config: &ScanConfig) -> Result<ScanContext> {
        ScanContext::new(self.store.clone(), config)
    }

    /// Every entity of every tenant, as `(scope, id)` records.
    ///
    /// The ring layout is read up front; if it cannot be read the scan does
    /// not start. Tenants and their collection lists are walked lazily and
    /// each collection becomes one concurrently drained branch. Callers
    /// interested in one tenant filter on `record.scope`.
    pub async fn scan_all_entities(&self, config: &ScanConfig) -> Result<ScanStream<EntityRecord>> {
        let ctx = self.context(config)?;
        let ranges = PartitionTokenSource::new(ctx.clone())
            .ranges_for_full_scan()
            .await?;
        info!(
            ranges = ranges.len(),
            page_size = config.page_size,
            max_concurrency = config.max_concurrency,
            mode = ?config.failure_mode,
            "starting full entity scan"
        );

        let tenants = TenantEnumerator::new(ctx.clone());
        let types = CollectionTypeEnumerator::new(ctx.clone());
        let ids = EntityIdEnumerator::new(ctx);

        let branches = stream::iter(ranges)
            .flat_map(move |range| tenants.scopes_in_range(range))
            .flat_map(move |scope| match scope {
                Ok(scope) => {
                    let ids = ids.clone();
                    types
                        .types_in_scope(&scope)
                        .map_ok(move |entity_type| collection_branch(&ids, &scope, entity_type))
                        .left_stream()
                }
                Err(e) => stream::once(futures::future::ready(Err(e))).right_stream(),
            })
            .boxed();

        Ok(StreamComposer::new(config).compose(branches))
    }

    /// Targets of every outgoing edge of `source`, one branch per edge type.
    pub async fn scan_connections(
        &self,
        source: &EntityId,
        config: &ScanConfig,
    ) -> Result<ScanStream<EntityId>> {
        let ctx = self.context(config)?;
        info!(%source, page_size = config.page_size, "starting connection scan");

        let targets = EdgeTargetEnumerator::new(ctx.clone());
        let node = source.clone();
        let branches = EdgeTypeEnumerator::new(ctx)
            .edge_types_from(source)
            .map_ok(move |edge_type| {
                Branch::new(
                    BranchKey::EdgeTargets {
                        source: node.clone(),
                        edge_type: edge_type.clone(),
                    },
                    targets.targets_of(&node, &edge_type, None),
                )
            })
            .boxed();

        Ok(StreamComposer::new(config).compose(branches))
    }

    /// Targets of `edge_type` edges leaving `source`.
    pub async fn scan_connections_of_type(
        &self,
        source: &EntityId,
        edge_type: &EdgeType,
        config: &ScanConfig,
    ) -> Result<ScanStream<EntityId>> {
        let ctx = self.context(config)?;
        info!(%source, %edge_type, page_size = config.page_size, "starting typed connection scan");

        let branch = Branch::new(
            BranchKey::EdgeTargets {
                source: source.clone(),
                edge_type: edge_type.clone(),
            },
            EdgeTargetEnumerator::new(ctx).targets_of(source, edge_type, None),
        );
        Ok(StreamComposer::new(config).compose(stream::iter([Ok(branch)]).boxed()))
    }
}

fn collection_branch(
    ids: &EntityIdEnumerator,
    scope: &ApplicationScope,
    entity_type: String,
) -> Branch<EntityRecord> {
    let record_scope = scope.clone();
    let items = ids
        .ids_of_type(scope, &entity_type, None)
        .map_ok(move |id| EntityRecord::new(record_scope.clone(), id))
        .boxed();
    Branch::new(
        BranchKey::Collection {
            scope: scope.clone(),
            entity_type,
        },
        items,
    )
}

impl std::fmt::Debug for ScanEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine").finish_non_exhaustive()
    }
}
