//! Streaming full-system scans.
//!
//! A scan walks the token ring, the tenants placed on it, their collections
//! and finally the ids in each collection, merging the innermost branches
//! into one bounded, cancellable stream. Connection scans do the same
//! starting from one node's outgoing edges.

pub mod collection_types;
pub mod composer;
pub mod context;
pub mod edge_targets;
pub mod edge_types;
pub mod engine;
pub mod entity_ids;
pub mod gate;
mod pager;
pub mod retry;
pub mod scopes;
pub mod token_source;

pub use collection_types::CollectionTypeEnumerator;
pub use composer::{Branch, ScanReport, ScanStream, StreamComposer};
pub use context::ScanContext;
pub use edge_targets::EdgeTargetEnumerator;
pub use edge_types::EdgeTypeEnumerator;
pub use engine::ScanEngine;
pub use entity_ids::EntityIdEnumerator;
pub use gate::FetchGate;
pub use retry::RetryPolicy;
pub use scopes::TenantEnumerator;
pub use token_source::PartitionTokenSource;
