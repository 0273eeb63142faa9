use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Type tag carried by the root node of every tenant.
pub const APPLICATION_TYPE: &str = "application";

/// Identifier of one entity: a globally unique uuid plus its type tag
/// (the collection name the entity lives in).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub uuid: Uuid,
    pub entity_type: String,
}

impl EntityId {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            entity_type: entity_type.into(),
        }
    }

    pub fn from_parts(uuid: Uuid, entity_type: impl Into<String>) -> Self {
        Self {
            uuid,
            entity_type: entity_type.into(),
        }
    }

    pub fn is_type(&self, entity_type: &str) -> bool {
        self.entity_type == entity_type
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.uuid)
    }
}

/// Tenant namespace. The only attribute is the tenant's root node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationScope {
    pub application: EntityId,
}

impl ApplicationScope {
    pub fn new(application: EntityId) -> Self {
        Self { application }
    }

    /// Mint a scope with a fresh root node id.
    pub fn generate() -> Self {
        Self::new(EntityId::new(APPLICATION_TYPE))
    }

    pub fn root(&self) -> &EntityId {
        &self.application
    }
}

impl fmt::Display for ApplicationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope({})", self.application.uuid)
    }
}

/// One unit of output of a full-system entity scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRecord {
    pub scope: ApplicationScope,
    pub entity_id: EntityId,
}

impl EntityRecord {
    pub fn new(scope: ApplicationScope, entity_id: EntityId) -> Self {
        Self { scope, entity_id }
    }
}

/// Name of a class of connection, scoped to its source node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeType(String);

impl EdgeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for EdgeType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EdgeType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Directed, typed relationship between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: EntityId,
    pub edge_type: EdgeType,
    pub target: EntityId,
    /// Monotonic creation stamp; breaks ties when paging.
    pub timestamp: u64,
}

impl Edge {
    pub fn new(source: EntityId, edge_type: EdgeType, target: EntityId, timestamp: u64) -> Self {
        Self {
            source,
            edge_type,
            target,
            timestamp,
        }
    }
}

/// Opaque store-defined resumption point. Equality is the only operation
/// the scan engine performs on it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PageToken(Bytes);

impl PageToken {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageToken({})", self)
    }
}

impl fmt::Display for PageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&general_purpose::URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// One page of a paginated store read. `next_token == None` marks the end
/// of data for the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<PageToken>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_token: Option<PageToken>) -> Self {
        Self { items, next_token }
    }

    /// Final page of a branch.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }

    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

/// Page request issued by the engine: resume point plus maximum page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub token: Option<PageToken>,
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { token: None, limit }
    }

    pub fn after(token: PageToken, limit: usize) -> Self {
        Self {
            token: Some(token),
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_compare_by_uuid_and_type() {
        let uuid = Uuid::new_v4();
        let a = EntityId::from_parts(uuid, "user");
        let b = EntityId::from_parts(uuid, "user");
        let c = EntityId::from_parts(uuid, "group");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_type("user"));
    }

    #[test]
    fn generated_scope_has_application_root() {
        let scope = ApplicationScope::generate();
        assert_eq!(scope.root().entity_type, APPLICATION_TYPE);
    }

    #[test]
    fn page_tokens_are_equal_by_content() {
        let a = PageToken::from_bytes(vec![1u8, 2, 3]);
        let b = PageToken::from_bytes(vec![1u8, 2, 3]);
        let c = PageToken::from_bytes(vec![3u8, 2, 1]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "AQID");
    }

    #[test]
    fn last_page_has_no_token() {
        let page: Page<u8> = Page::last(vec![1]);
        assert!(page.is_last());
        assert!(Page::<u8>::empty().items.is_empty());
        let next = Page::new(vec![1u8], Some(PageToken::from_bytes(vec![9u8])));
        assert!(!next.is_last());
    }

    #[test]
    fn edge_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&EdgeType::from("likes")).unwrap();
        assert_eq!(json, "\"likes\"");
    }
}
