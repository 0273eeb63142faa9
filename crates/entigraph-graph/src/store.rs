use crate::cursor::{Cursor, CursorKind};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use crossbeam_skiplist::SkipMap;
use entigraph_core::{
    ring_token, split_ring, ApplicationScope, Edge, EdgeType, EntityId, Page, PageRequest,
    PartitionRange, ScanStore, StoreConfig, StoreResult,
};
use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use uuid::Uuid;

const MAX_UUID: Uuid = Uuid::from_u128(u128::MAX);

/// Lock-free, ring-partitioned graph store held in memory.
///
/// - Tenants live in a `SkipMap` keyed by `(ring token, uuid)` so a
///   partition range is a contiguous key range.
/// - Outgoing edges per source node sit behind `ArcSwap<Vec<Edge>>`,
///   newest first, updated copy-on-write; readers never block writers.
/// - Collections are edges from the tenant root to each member, typed by
///   the member's entity type.
#[derive(Debug)]
pub struct MemoryGraphStore {
    ring: Vec<PartitionRange>,
    scope_page_limit: usize,
    scopes: SkipMap<(u64, Uuid), ApplicationScope>,
    adjacency: SkipMap<Uuid, Arc<ArcSwap<Vec<Edge>>>>,
    clock: AtomicU64,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

impl MemoryGraphStore {
    pub fn new(config: &StoreConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(1);
        Self {
            ring: split_ring(config.partitions),
            scope_page_limit: config.scope_page_limit.max(1),
            scopes: SkipMap::new(),
            adjacency: SkipMap::new(),
            clock: AtomicU64::new(seed),
        }
    }

    /// Provision a tenant with a fresh root node.
    pub fn create_scope(&self) -> ApplicationScope {
        let scope = ApplicationScope::generate();
        self.register_scope(scope.clone());
        scope
    }

    pub fn register_scope(&self, scope: ApplicationScope) {
        let uuid = scope.root().uuid;
        self.scopes.insert((ring_token(&uuid), uuid), scope);
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Create an entity of `entity_type` and add it to that collection of
    /// `scope`.
    pub fn create_entity(&self, scope: &ApplicationScope, entity_type: &str) -> EntityId {
        let id = EntityId::new(entity_type);
        self.create_connection(scope.root(), EdgeType::from(entity_type), &id);
        id
    }

    /// Add a directed edge `source -[edge_type]-> target`.
    pub fn create_connection(
        &self,
        source: &EntityId,
        edge_type: impl Into<EdgeType>,
        target: &EntityId,
    ) -> Edge {
        let edge = Edge::new(
            source.clone(),
            edge_type.into(),
            target.clone(),
            self.clock.fetch_add(1, Ordering::SeqCst),
        );
        let entry = self.edges_from(source.uuid);

        // RCU-style copy-on-write update: retry on contention
        entry.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.push(edge.clone());
            next.extend(current.iter().cloned());
            next
        });
        edge
    }

    /// Drop an entity from its collection and forget its outgoing edges.
    /// Edges pointing at it from other nodes are left alone.
    pub fn remove_entity(&self, scope: &ApplicationScope, id: &EntityId) {
        if let Some(entry) = self.adjacency.get(&scope.root().uuid) {
            entry.value().rcu(|current| {
                current
                    .iter()
                    .filter(|e| &e.target != id)
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
        self.adjacency.remove(&id.uuid);
    }

    /// Every target reachable over one edge, newest edge first.
    pub fn neighbors(&self, source: &EntityId) -> Vec<EntityId> {
        self.snapshot(source.uuid)
            .iter()
            .map(|e| e.target.clone())
            .collect()
    }

    fn edges_from(&self, source: Uuid) -> Arc<ArcSwap<Vec<Edge>>> {
        self.adjacency
            .get_or_insert_with(source, || Arc::new(ArcSwap::from_pointee(Vec::new())))
            .value()
            .clone()
    }

    fn snapshot(&self, source: Uuid) -> Arc<Vec<Edge>> {
        self.adjacency
            .get(&source)
            .map(|e| e.value().load_full())
            .unwrap_or_default()
    }

    fn page_targets(
        &self,
        source: &EntityId,
        edge_type: &str,
        request: &PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        let after = request
            .token
            .as_ref()
            .map(|t| Cursor::decode(t, CursorKind::Edge))
            .transpose()?;
        let edges = self.snapshot(source.uuid);
        let limit = request.limit.max(1);

        let mut matching = edges
            .iter()
            .filter(|e| e.edge_type.as_str() == edge_type)
            .skip_while(|e| match after {
                Some(cursor) => e.timestamp >= cursor.position,
                None => false,
            })
            .take(limit.saturating_add(1))
            .collect::<Vec<_>>();

        let has_more = matching.len() > limit;
        matching.truncate(limit);
        let next_token = match (has_more, matching.last()) {
            (true, Some(last)) => {
                Some(Cursor::new(last.timestamp, last.target.uuid).encode(CursorKind::Edge))
            }
            _ => None,
        };
        Ok(Page::new(
            matching.into_iter().map(|e| e.target.clone()).collect(),
            next_token,
        ))
    }
}

#[async_trait]
impl ScanStore for MemoryGraphStore {
    async fn list_partition_ranges(&self) -> StoreResult<Vec<PartitionRange>> {
        Ok(self.ring.clone())
    }

    async fn page_scopes(
        &self,
        range: &PartitionRange,
        request: PageRequest,
    ) -> StoreResult<Page<ApplicationScope>> {
        let lower = match &request.token {
            Some(token) => {
                let cursor = Cursor::decode(token, CursorKind::Scope)?;
                Bound::Excluded((cursor.position, cursor.uuid))
            }
            None => Bound::Included((range.start, Uuid::nil())),
        };
        let upper = Bound::Included((range.end, MAX_UUID));
        let limit = request.limit.clamp(1, self.scope_page_limit);

        let mut rows = self
            .scopes
            .range((lower, upper))
            .take(limit.saturating_add(1))
            .map(|e| (*e.key(), e.value().clone()))
            .collect::<Vec<_>>();

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_token = match (has_more, rows.last()) {
            (true, Some(((position, uuid), _))) => {
                Some(Cursor::new(*position, *uuid).encode(CursorKind::Scope))
            }
            _ => None,
        };
        debug!(%range, rows = rows.len(), more = has_more, "scope page");
        Ok(Page::new(
            rows.into_iter().map(|(_, scope)| scope).collect(),
            next_token,
        ))
    }

    async fn page_edge_types(&self, node: &EntityId) -> StoreResult<Vec<EdgeType>> {
        let types = self
            .snapshot(node.uuid)
            .iter()
            .map(|e| e.edge_type.clone())
            .collect::<BTreeSet<_>>();
        Ok(types.into_iter().collect())
    }

    async fn page_edge_targets(
        &self,
        node: &EntityId,
        edge_type: &EdgeType,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        self.page_targets(node, edge_type.as_str(), &request)
    }

    async fn page_entity_ids(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        self.page_targets(scope.root(), entity_type, &request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store_with_partitions(partitions: usize, scope_page_limit: usize) -> MemoryGraphStore {
        MemoryGraphStore::new(&StoreConfig {
            partitions,
            scope_page_limit,
        })
    }

    #[test]
    fn edges_are_listed_newest_first() {
        let store = MemoryGraphStore::default();
        let source = EntityId::new("user");
        let a = EntityId::new("user");
        let b = EntityId::new("user");
        store.create_connection(&source, "likes", &a);
        store.create_connection(&source, "likes", &b);
        assert_eq!(store.neighbors(&source), vec![b.clone(), a.clone()]);

        let page = tokio_test::block_on(store.page_edge_targets(
            &source,
            &EdgeType::from("likes"),
            PageRequest::first(10),
        ))
        .unwrap();
        assert_eq!(page.items, vec![b, a]);
    }

    #[tokio::test]
    async fn unbounded_limits_return_everything() {
        let store = store_with_partitions(1, usize::MAX);
        let source = EntityId::new("user");
        for _ in 0..3 {
            store.create_connection(&source, "likes", &EntityId::new("user"));
        }
        let page = store
            .page_edge_targets(&source, &EdgeType::from("likes"), PageRequest::first(usize::MAX))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_token.is_none());

        for _ in 0..4 {
            store.create_scope();
        }
        let scopes = store
            .page_scopes(&PartitionRange::full_ring(), PageRequest::first(usize::MAX))
            .await
            .unwrap();
        assert_eq!(scopes.items.len(), 4);
        assert!(scopes.next_token.is_none());
    }

    #[tokio::test]
    async fn edge_types_are_distinct() {
        let store = MemoryGraphStore::default();
        let source = EntityId::new("user");
        for _ in 0..3 {
            store.create_connection(&source, "likes", &EntityId::new("user"));
        }
        store.create_connection(&source, "owns", &EntityId::new("device"));
        let types = store.page_edge_types(&source).await.unwrap();
        assert_eq!(types, vec![EdgeType::from("likes"), EdgeType::from("owns")]);
        assert!(store
            .page_edge_types(&EntityId::new("user"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn target_pages_resume_from_token() {
        let store = MemoryGraphStore::default();
        let source = EntityId::new("user");
        let mut created = Vec::new();
        for _ in 0..5 {
            let target = EntityId::new("user");
            store.create_connection(&source, "likes", &target);
            created.push(target);
        }
        store.create_connection(&source, "owns", &EntityId::new("device"));

        let likes = EdgeType::from("likes");
        let first = store
            .page_edge_targets(&source, &likes, PageRequest::first(2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        let token = first.next_token.clone().unwrap();

        let second = store
            .page_edge_targets(&source, &likes, PageRequest::after(token, 2))
            .await
            .unwrap();
        let third = store
            .page_edge_targets(
                &source,
                &likes,
                PageRequest::after(second.next_token.clone().unwrap(), 2),
            )
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.is_last());

        let seen: Vec<_> = first
            .items
            .into_iter()
            .chain(second.items)
            .chain(third.items)
            .collect();
        created.reverse();
        assert_eq!(seen, created);
    }

    #[tokio::test]
    async fn exact_multiple_ends_without_trailing_page() {
        let store = MemoryGraphStore::default();
        let scope = store.create_scope();
        for _ in 0..4 {
            store.create_entity(&scope, "widget");
        }
        let first = store
            .page_entity_ids(&scope, "widget", PageRequest::first(2))
            .await
            .unwrap();
        let second = store
            .page_entity_ids(&scope, "widget", PageRequest::after(first.next_token.unwrap(), 2))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn scopes_are_partitioned_by_ring_token() {
        let store = store_with_partitions(4, 3);
        let created: HashSet<_> = (0..20).map(|_| store.create_scope()).collect();

        let mut seen = HashSet::new();
        for range in store.list_partition_ranges().await.unwrap() {
            let mut request = PageRequest::first(100);
            loop {
                let page = store.page_scopes(&range, request.clone()).await.unwrap();
                assert!(page.items.len() <= 3);
                for scope in page.items {
                    assert!(range.contains(ring_token(&scope.root().uuid)));
                    assert!(seen.insert(scope));
                }
                match page.next_token {
                    Some(token) => request = PageRequest::after(token, 100),
                    None => break,
                }
            }
        }
        assert_eq!(seen, created);
    }

    #[tokio::test]
    async fn foreign_token_is_rejected() {
        let store = MemoryGraphStore::default();
        store.create_scope();
        let range = PartitionRange::full_ring();
        let token = Cursor::new(1, Uuid::new_v4()).encode(CursorKind::Edge);
        let result = store
            .page_scopes(&range, PageRequest::after(token, 10))
            .await;
        assert!(result.is_err());
        assert_eq!(store.scope_count(), 1);
    }

    #[tokio::test]
    async fn removed_entity_leaves_collection() {
        let store = MemoryGraphStore::default();
        let scope = store.create_scope();
        let keep = store.create_entity(&scope, "widget");
        let gone = store.create_entity(&scope, "widget");
        store.create_connection(&gone, "likes", &keep);
        store.remove_entity(&scope, &gone);

        let page = store
            .page_entity_ids(&scope, "widget", PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items, vec![keep]);
        assert!(store.neighbors(&gone).is_empty());
    }
}
