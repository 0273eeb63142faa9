use crate::gate::FetchGate;
use crate::retry::RetryPolicy;
use entigraph_core::{ScanConfig, ScanError, ScanStore};
use std::sync::Arc;

/// Shared state of one scan: the store, the fetch gate every layer goes
/// through, and the page size.
#[derive(Clone)]
pub struct ScanContext {
    pub(crate) store: Arc<dyn ScanStore>,
    pub(crate) gate: FetchGate,
    pub(crate) page_size: usize,
}

impl ScanContext {
    /// Build a context with a fresh gate sized from `config`.
    pub fn new(store: Arc<dyn ScanStore>, config: &ScanConfig) -> Result<Self, ScanError> {
        config
            .validate()
            .map_err(|e| ScanError::InvalidConfig(e.to_string()))?;
        let gate = FetchGate::new(
            config.max_concurrency,
            RetryPolicy::from_config(config),
            config.per_call_timeout(),
        );
        Ok(Self {
            store,
            gate,
            page_size: config.page_size,
        })
    }

    pub fn gate(&self) -> &FetchGate {
        &self.gate
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("gate", &self.gate)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
