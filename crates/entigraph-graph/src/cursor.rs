//! Page token layout private to the in-memory store.
//!
//! `[kind: u8][position: u64 BE][uuid: 16 bytes]`. The scan engine never
//! looks inside; it only hands tokens back.

use bytes::{BufMut, BytesMut};
use entigraph_core::{PageToken, StoreError, StoreResult};
use uuid::Uuid;

const TOKEN_LEN: usize = 1 + 8 + 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum CursorKind {
    Scope = b'S',
    Edge = b'E',
}

/// Last row returned by a page: ring token or edge timestamp, plus the uuid
/// that breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub position: u64,
    pub uuid: Uuid,
}

impl Cursor {
    pub fn new(position: u64, uuid: Uuid) -> Self {
        Self { position, uuid }
    }

    pub fn encode(&self, kind: CursorKind) -> PageToken {
        let mut buf = BytesMut::with_capacity(TOKEN_LEN);
        buf.put_u8(kind as u8);
        buf.put_u64(self.position);
        buf.put_slice(self.uuid.as_bytes());
        PageToken::from_bytes(buf.freeze())
    }

    pub fn decode(token: &PageToken, kind: CursorKind) -> StoreResult<Self> {
        let bytes = token.as_bytes();
        if bytes.len() != TOKEN_LEN || bytes[0] != kind as u8 {
            return Err(StoreError::Rejected(format!("malformed page token {}", token)));
        }
        let mut position = [0u8; 8];
        position.copy_from_slice(&bytes[1..9]);
        let uuid = Uuid::from_slice(&bytes[9..])
            .map_err(|e| StoreError::Rejected(format!("malformed page token: {}", e)))?;
        Ok(Self {
            position: u64::from_be_bytes(position),
            uuid,
        })
    }
}
