use crate::{ApplicationScope, EdgeType, EntityId, PageToken, PartitionRange};
use std::fmt;
use thiserror::Error;

/// Error reported by a backing store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store call timed out")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store overloaded: {0}")]
    Overloaded(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Transient failures worth retrying with the same request.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout | StoreError::Unavailable(_) | StoreError::Overloaded(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One independently enumerated branch of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchKey {
    /// Tenant listing within one ring slice.
    Partition(PartitionRange),
    /// Collection type listing under one tenant root.
    Scope(ApplicationScope),
    /// Entity ids of one type within one tenant.
    Collection {
        scope: ApplicationScope,
        entity_type: String,
    },
    /// Edge type listing of one node.
    EdgeTypes { source: EntityId },
    /// Targets of one edge type from one node.
    EdgeTargets {
        source: EntityId,
        edge_type: EdgeType,
    },
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKey::Partition(range) => write!(f, "partition {}", range),
            BranchKey::Scope(scope) => write!(f, "types of {}", scope),
            BranchKey::Collection { scope, entity_type } => {
                write!(f, "collection '{}' of {}", entity_type, scope)
            }
            BranchKey::EdgeTypes { source } => write!(f, "edge types of {}", source),
            BranchKey::EdgeTargets { source, edge_type } => {
                write!(f, "'{}' targets of {}", edge_type, source)
            }
        }
    }
}

/// A branch that was abandoned, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub branch: BranchKey,
    pub error: ScanError,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.branch, self.error)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("store topology unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("page fetch failed for {branch} after token {}: {source}", display_token(.last_token))]
    ScanPageFailed {
        branch: BranchKey,
        last_token: Option<PageToken>,
        #[source]
        source: StoreError,
    },

    #[error("paging stalled for {branch}: token {token} did not advance")]
    PagingStalled { branch: BranchKey, token: PageToken },

    #[error("scan cancelled")]
    Cancelled,

    #[error("scan finished with {} skipped branch(es): {}", .failures.len(), display_failures(.failures))]
    Incomplete { failures: Vec<BranchFailure> },

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("scan aborted: {0}")]
    Aborted(String),
}

impl ScanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }

    /// Branch the error belongs to, when it is branch-local.
    pub fn branch(&self) -> Option<&BranchKey> {
        match self {
            ScanError::ScanPageFailed { branch, .. } | ScanError::PagingStalled { branch, .. } => {
                Some(branch)
            }
            _ => None,
        }
    }
}

fn display_token(token: &Option<PageToken>) -> String {
    token
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<start>".to_string())
}

fn display_failures(failures: &[BranchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ScanError>;
