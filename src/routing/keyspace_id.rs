use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result, Value};

/// Width in bytes of an encoded keyspace id.
pub const KEYSPACE_ID_WIDTH: usize = 8;

/// Routing token derived from a shard key.
///
/// Encoded as a fixed-width big-endian 64-bit integer, so byte order and
/// numeric order agree and encoded tokens can be compared against key-range
/// bounds directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyspaceId(u64);

impl KeyspaceId {
    pub const MIN: KeyspaceId = KeyspaceId(0);
    pub const MAX: KeyspaceId = KeyspaceId(u64::MAX);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Encodes the token as 8 big-endian bytes.
    pub fn encode(&self) -> [u8; KEYSPACE_ID_WIDTH] {
        self.0.to_be_bytes()
    }

    /// Decodes an encoded token.
    ///
    /// Fails with `FormatError` unless `token` is exactly 8 bytes long.
    pub fn decode(token: &[u8]) -> Result<Self> {
        let bytes: [u8; KEYSPACE_ID_WIDTH] = token.try_into().map_err(|_| {
            DbError::FormatError(format!(
                "keyspace id must be {} bytes, got {}",
                KEYSPACE_ID_WIDTH,
                token.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }

    /// Parses the 16-digit hex rendering produced by `Display`.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != KEYSPACE_ID_WIDTH * 2 {
            return Err(DbError::FormatError(format!(
                "keyspace id hex must be {} digits, got '{}'",
                KEYSPACE_ID_WIDTH * 2,
                hex
            )));
        }
        u64::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|e| DbError::FormatError(format!("invalid keyspace id '{}': {}", hex, e)))
    }
}

impl From<u64> for KeyspaceId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Keyspace-id columns are signed 64-bit; the id is stored as its bit pattern.
impl From<KeyspaceId> for Value {
    fn from(kid: KeyspaceId) -> Self {
        Value::Integer(kid.0 as i64)
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

pub fn pack_keyspace_id(kid: u64) -> [u8; KEYSPACE_ID_WIDTH] {
    KeyspaceId(kid).encode()
}

pub fn unpack_keyspace_id(token: &[u8]) -> Result<u64> {
    KeyspaceId::decode(token).map(|kid| kid.value())
}
