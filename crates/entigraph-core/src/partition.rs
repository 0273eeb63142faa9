//! Token ring utilities.
//!
//! The store places every tenant root on a `u64` token ring. A full scan
//! visits the ring as a list of contiguous, non-overlapping ranges.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Contiguous slice `[start, end]` of the token ring, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionRange {
    pub start: u64,
    pub end: u64,
}

impl PartitionRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "partition range start must not exceed end");
        Self { start, end }
    }

    pub fn full_ring() -> Self {
        Self::new(0, u64::MAX)
    }

    #[inline]
    pub fn contains(&self, token: u64) -> bool {
        self.start <= token && token <= self.end
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#018x}..={:#018x}]", self.start, self.end)
    }
}

/// Split the ring into `parts` contiguous ranges of near-equal width.
pub fn split_ring(parts: usize) -> Vec<PartitionRange> {
    let parts = parts.max(1) as u128;
    let span = u64::MAX as u128 + 1;
    (0..parts)
        .map(|i| {
            let start = span * i / parts;
            let end = span * (i + 1) / parts - 1;
            PartitionRange::new(start as u64, end as u64)
        })
        .collect()
}

/// Ring placement of a node: the first eight bytes of its uuid, big-endian.
pub fn ring_token(uuid: &Uuid) -> u64 {
    uuid.as_u64_pair().0
}

/// Why a set of ranges does not describe the whole ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingCoverageError {
    Empty,
    Gap { after: u64, next_start: u64 },
    Overlap { previous: PartitionRange, next: PartitionRange },
    MissingHead(u64),
    MissingTail(u64),
}

impl fmt::Display for RingCoverageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "no partition ranges"),
            Self::Gap { after, next_start } => {
                write!(f, "gap between {:#x} and {:#x}", after, next_start)
            }
            Self::Overlap { previous, next } => write!(f, "{} overlaps {}", previous, next),
            Self::MissingHead(start) => write!(f, "ring starts at {:#x} instead of 0", start),
            Self::MissingTail(end) => write!(f, "ring ends at {:#x} instead of u64::MAX", end),
        }
    }
}

/// Sort ranges into ring order and check they tile the whole ring exactly.
pub fn normalize_ring(
    mut ranges: Vec<PartitionRange>,
) -> Result<Vec<PartitionRange>, RingCoverageError> {
    if ranges.is_empty() {
        return Err(RingCoverageError::Empty);
    }
    ranges.sort();

    let first = ranges[0];
    if first.start != 0 {
        return Err(RingCoverageError::MissingHead(first.start));
    }
    for pair in ranges.windows(2) {
        let (previous, next) = (pair[0], pair[1]);
        if next.start <= previous.end {
            return Err(RingCoverageError::Overlap { previous, next });
        }
        if next.start != previous.end + 1 {
            return Err(RingCoverageError::Gap {
                after: previous.end,
                next_start: next.start,
            });
        }
    }
    let last = ranges[ranges.len() - 1];
    if last.end != u64::MAX {
        return Err(RingCoverageError::MissingTail(last.end));
    }
    Ok(ranges)
}
