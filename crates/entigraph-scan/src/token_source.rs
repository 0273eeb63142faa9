use crate::context::ScanContext;
use entigraph_core::{normalize_ring, PartitionRange, Result, ScanError};
use tracing::{debug, error};

/// Reads the token ring layout a full scan walks.
#[derive(Debug, Clone)]
pub struct PartitionTokenSource {
    ctx: ScanContext,
}

impl PartitionTokenSource {
    pub fn new(ctx: ScanContext) -> Self {
        Self { ctx }
    }

    /// Every range of the ring, in ring order, covering it exactly once.
    ///
    /// An unreachable store or a layout that leaves gaps or overlaps is
    /// `StoreUnavailable`; no scan should start on it.
    pub async fn ranges_for_full_scan(&self) -> Result<Vec<PartitionRange>> {
        let store = &self.ctx.store;
        let ranges = self
            .ctx
            .gate
            .call(&"partition ranges", move || store.list_partition_ranges())
            .await
            .map_err(|e| {
                error!(error = %e, "could not read partition ranges");
                ScanError::StoreUnavailable {
                    reason: e.to_string(),
                }
            })?;

        let ranges = normalize_ring(ranges).map_err(|e| {
            error!(error = %e, "partition ranges do not cover the ring");
            ScanError::StoreUnavailable {
                reason: format!("invalid ring layout: {}", e),
            }
        })?;
        debug!(ranges = ranges.len(), "ring layout read");
        Ok(ranges)
    }
}
