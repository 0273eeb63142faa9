use crate::{
    ApplicationScope, EdgeType, EntityId, Page, PageRequest, PartitionRange, StoreResult,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Read surface of the backing store that full-system scans run against.
///
/// Every call may suspend on network I/O. Paged calls return
/// `next_token == None` once the branch is exhausted, and resume from the
/// token handed back by the previous page.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Current token ring layout.
    async fn list_partition_ranges(&self) -> StoreResult<Vec<PartitionRange>>;

    /// Tenants whose root node is placed inside `range`.
    async fn page_scopes(
        &self,
        range: &PartitionRange,
        request: PageRequest,
    ) -> StoreResult<Page<ApplicationScope>>;

    /// Distinct outgoing edge types of `node`. Small enough to be unpaged.
    async fn page_edge_types(&self, node: &EntityId) -> StoreResult<Vec<EdgeType>>;

    /// Targets of `edge_type` edges leaving `node`, in store-native order.
    async fn page_edge_targets(
        &self,
        node: &EntityId,
        edge_type: &EdgeType,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>>;

    /// Ids of entities of `entity_type` within `scope`.
    async fn page_entity_ids(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>>;
}

#[async_trait]
impl<S: ScanStore + ?Sized> ScanStore for Arc<S> {
    async fn list_partition_ranges(&self) -> StoreResult<Vec<PartitionRange>> {
        (**self).list_partition_ranges().await
    }

    async fn page_scopes(
        &self,
        range: &PartitionRange,
        request: PageRequest,
    ) -> StoreResult<Page<ApplicationScope>> {
        (**self).page_scopes(range, request).await
    }

    async fn page_edge_types(&self, node: &EntityId) -> StoreResult<Vec<EdgeType>> {
        (**self).page_edge_types(node).await
    }

    async fn page_edge_targets(
        &self,
        node: &EntityId,
        edge_type: &EdgeType,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        (**self).page_edge_targets(node, edge_type, request).await
    }

    async fn page_entity_ids(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        (**self).page_entity_ids(scope, entity_type, request).await
    }
}
