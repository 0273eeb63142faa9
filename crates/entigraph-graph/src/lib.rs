//! In-memory, ring-partitioned graph store.
//!
//! - `store`: lock-free tenant index and adjacency lists (SkipMap + ArcSwap)
//! - `cursor`: the store's private page token layout

mod cursor;
pub mod store;

pub use store::MemoryGraphStore;
