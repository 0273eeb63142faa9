#![allow(dead_code)]

use async_trait::async_trait;
use entigraph_core::{
    ApplicationScope, EdgeType, EntityId, FailureMode, Page, PageRequest, PageToken,
    PartitionRange, ScanConfig, ScanStore, StoreConfig, StoreError, StoreResult,
};
use entigraph_graph::MemoryGraphStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Config with fast retries so failure tests stay quick.
pub fn test_config(page_size: usize) -> ScanConfig {
    ScanConfig::default()
        .with_page_size(page_size)
        .with_max_concurrency(4)
        .with_per_call_timeout(Duration::from_secs(5))
        .with_retry(3, Duration::from_millis(1))
}

pub fn best_effort(page_size: usize) -> ScanConfig {
    test_config(page_size).with_failure_mode(FailureMode::BestEffort)
}

pub fn memory_store() -> MemoryGraphStore {
    MemoryGraphStore::new(&StoreConfig {
        partitions: 4,
        scope_page_limit: 3,
    })
}

/// Tenant with 10 `type1thing`, 10 `type2thing`, and the first `type1thing`
/// liking every `type2thing`.
pub struct Scenario {
    pub scope: ApplicationScope,
    pub type1: Vec<EntityId>,
    pub type2: Vec<EntityId>,
}

impl Scenario {
    pub fn seed(store: &MemoryGraphStore) -> Self {
        let scope = store.create_scope();
        let type1: Vec<_> = (0..10)
            .map(|_| store.create_entity(&scope, "type1thing"))
            .collect();
        let type2: Vec<_> = (0..10)
            .map(|_| store.create_entity(&scope, "type2thing"))
            .collect();
        for target in &type2 {
            store.create_connection(&type1[0], "likes", target);
        }
        Self {
            scope,
            type1,
            type2,
        }
    }

    pub fn source(&self) -> &EntityId {
        &self.type1[0]
    }

    pub fn all_entities(&self) -> Vec<EntityId> {
        self.type1.iter().chain(self.type2.iter()).cloned().collect()
    }
}

pub fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
    items.sort();
    items
}

#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail the next `remaining` calls, then behave.
    Transient { error: StoreError, remaining: usize },
    /// Serve `after_pages` pages, then fail every call.
    Permanent { error: StoreError, after_pages: usize },
    /// Serve the first page, then keep handing back the token received.
    Stall,
    /// Turn the final page into a non-final one followed by an empty page.
    TrailingEmptyPage,
}

const TRAILER: &[u8] = b"trailer";

/// Fault key of the tenant listing, shared by every ring range.
pub const SCOPES: &str = "scopes";

/// Fault key of the edge type listing of `node`.
pub fn edge_types_key(node: &EntityId) -> String {
    format!("edge_types:{}", node)
}

/// Wraps the memory store and injects faults into its listings. Id and
/// target pages are keyed by entity or edge type name, tenant pages by
/// [`SCOPES`] and edge type lists by [`edge_types_key`].
pub struct FaultyStore {
    inner: MemoryGraphStore,
    faults: Mutex<HashMap<String, Fault>>,
    served: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<(String, Option<PageToken>)>>,
    ring: Mutex<Option<StoreResult<Vec<PartitionRange>>>>,
    latency: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FaultyStore {
    pub fn new(inner: MemoryGraphStore) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            served: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            ring: Mutex::new(None),
            latency: Mutex::new(None),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryGraphStore {
        &self.inner
    }

    pub fn inject(&self, key: &str, fault: Fault) {
        self.faults.lock().insert(key.to_string(), fault);
    }

    pub fn override_ring(&self, ring: StoreResult<Vec<PartitionRange>>) {
        *self.ring.lock() = Some(ring);
    }

    /// Delay every faultable call, failed attempts included.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Most faultable calls ever running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Request tokens seen for `key`, in call order.
    pub fn requests_for(&self, key: &str) -> Vec<Option<PageToken>> {
        self.requests
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, token)| token.clone())
            .collect()
    }

    async fn with_faults<T, F>(
        &self,
        key: &str,
        request: PageRequest,
        serve: F,
    ) -> StoreResult<Page<T>>
    where
        F: std::future::Future<Output = StoreResult<Page<T>>>,
    {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.active);

        self.requests
            .lock()
            .push((key.to_string(), request.token.clone()));
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let fault = self.faults.lock().get(key).cloned();
        match fault {
            None => serve.await,
            Some(Fault::Transient { error, remaining }) => {
                if remaining > 0 {
                    self.faults.lock().insert(
                        key.to_string(),
                        Fault::Transient {
                            error: error.clone(),
                            remaining: remaining - 1,
                        },
                    );
                    return Err(error);
                }
                serve.await
            }
            Some(Fault::Permanent { error, after_pages }) => {
                let exhausted = {
                    let mut served = self.served.lock();
                    let count = served.entry(key.to_string()).or_insert(0);
                    *count += 1;
                    *count > after_pages
                };
                if exhausted {
                    return Err(error);
                }
                serve.await
            }
            Some(Fault::Stall) => match request.token {
                Some(token) => Ok(Page::new(Vec::new(), Some(token))),
                None => serve.await,
            },
            Some(Fault::TrailingEmptyPage) => {
                if request.token.as_ref().map(|t| t.as_bytes()) == Some(TRAILER) {
                    return Ok(Page::empty());
                }
                let page = serve.await?;
                if page.is_last() {
                    Ok(Page::new(page.items, Some(PageToken::from_bytes(TRAILER))))
                } else {
                    Ok(page)
                }
            }
        }
    }
}

#[async_trait]
impl ScanStore for FaultyStore {
    async fn list_partition_ranges(&self) -> StoreResult<Vec<PartitionRange>> {
        let ring = self.ring.lock().clone();
        match ring {
            Some(ring) => ring,
            None => self.inner.list_partition_ranges().await,
        }
    }

    async fn page_scopes(
        &self,
        range: &PartitionRange,
        request: PageRequest,
    ) -> StoreResult<Page<ApplicationScope>> {
        let forwarded = request.clone();
        self.with_faults(SCOPES, request, self.inner.page_scopes(range, forwarded))
            .await
    }

    async fn page_edge_types(&self, node: &EntityId) -> StoreResult<Vec<EdgeType>> {
        let listing = async { self.inner.page_edge_types(node).await.map(Page::last) };
        self.with_faults(&edge_types_key(node), PageRequest::first(1), listing)
            .await
            .map(|page| page.items)
    }

    async fn page_edge_targets(
        &self,
        node: &EntityId,
        edge_type: &EdgeType,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        let forwarded = request.clone();
        self.with_faults(
            edge_type.as_str(),
            request,
            self.inner.page_edge_targets(node, edge_type, forwarded),
        )
        .await
    }

    async fn page_entity_ids(
        &self,
        scope: &ApplicationScope,
        entity_type: &str,
        request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        let forwarded = request.clone();
        self.with_faults(
            entity_type,
            request,
            self.inner.page_entity_ids(scope, entity_type, forwarded),
        )
        .await
    }
}

/// Node with `fan_out` edge types whose target pages are only served once
/// the test hands out a signal. Tracks how many fetches are parked.
pub struct GatedStore {
    pub source: EntityId,
    edge_types: Vec<EdgeType>,
    signals: Semaphore,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl GatedStore {
    pub fn new(fan_out: usize) -> Arc<Self> {
        Arc::new(Self {
            source: EntityId::new("hub"),
            edge_types: (0..fan_out)
                .map(|i| EdgeType::new(format!("rel{}", i)))
                .collect(),
            signals: Semaphore::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn release(&self, pages: usize) {
        self.signals.add_permits(pages);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanStore for GatedStore {
    async fn list_partition_ranges(&self) -> StoreResult<Vec<PartitionRange>> {
        Ok(vec![PartitionRange::full_ring()])
    }

    async fn page_scopes(
        &self,
        _range: &PartitionRange,
        _request: PageRequest,
    ) -> StoreResult<Page<ApplicationScope>> {
        Ok(Page::empty())
    }

    async fn page_edge_types(&self, node: &EntityId) -> StoreResult<Vec<EdgeType>> {
        if node == &self.source {
            Ok(self.edge_types.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn page_edge_targets(
        &self,
        _node: &EntityId,
        edge_type: &EdgeType,
        _request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let permit = self
            .signals
            .acquire()
            .await
            .map_err(|_| StoreError::Unavailable("signals closed".into()))?;
        permit.forget();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Page::last(vec![EntityId::new(edge_type.as_str())]))
    }

    async fn page_entity_ids(
        &self,
        _scope: &ApplicationScope,
        _entity_type: &str,
        _request: PageRequest,
    ) -> StoreResult<Page<EntityId>> {
        Ok(Page::empty())
    }
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
