use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result, Value};
use crate::routing::KeyspaceId;

/// Per-table rules for shard keys.
///
/// The key-to-token mapping must stay stable for the lifetime of the data:
/// rows are placed by the keyspace id computed at insert time.
pub trait ShardKeyPolicy: Send + Sync + fmt::Debug {
    /// Returns true when `key` can be used to route a query.
    fn is_sharding_key_valid(&self, key: &Value) -> bool;

    /// Derives the routing token for `key`.
    fn sharding_key_to_keyspace_id(&self, key: &Value) -> Result<KeyspaceId>;
}

/// Built-in key transforms selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardKeyTransform {
    /// Non-negative integer keys used as their own keyspace id.
    /// Order-preserving, so contiguous keys land in contiguous ranges.
    #[default]
    Identity,
    /// 64-bit FNV-1a over the key's canonical bytes.
    /// Accepts integer and text keys and spreads them uniformly.
    Fnv1a,
}

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

const TAG_INTEGER: u8 = 0x01;
const TAG_TEXT: u8 = 0x03;

pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn canonical_key_bytes(key: &Value) -> Option<Vec<u8>> {
    match key {
        Value::Integer(i) => {
            let mut bytes = Vec::with_capacity(9);
            bytes.push(TAG_INTEGER);
            bytes.extend_from_slice(&i.to_be_bytes());
            Some(bytes)
        }
        Value::Text(s) if !s.is_empty() => {
            let mut bytes = Vec::with_capacity(s.len() + 1);
            bytes.push(TAG_TEXT);
            bytes.extend_from_slice(s.as_bytes());
            Some(bytes)
        }
        _ => None,
    }
}

impl ShardKeyPolicy for ShardKeyTransform {
    fn is_sharding_key_valid(&self, key: &Value) -> bool {
        match self {
            Self::Identity => matches!(key, Value::Integer(i) if *i >= 0),
            Self::Fnv1a => canonical_key_bytes(key).is_some(),
        }
    }

    fn sharding_key_to_keyspace_id(&self, key: &Value) -> Result<KeyspaceId> {
        if !self.is_sharding_key_valid(key) {
            return Err(DbError::ValidationError(format!(
                "Invalid sharding_key {} for {:?} transform",
                key, self
            )));
        }
        match (self, key) {
            (Self::Identity, Value::Integer(i)) => Ok(KeyspaceId::new(*i as u64)),
            (Self::Fnv1a, _) => {
                let bytes = canonical_key_bytes(key).unwrap_or_default();
                Ok(KeyspaceId::new(fnv1a_64(&bytes)))
            }
            _ => Err(DbError::ValidationError(format!(
                "Invalid sharding_key {}",
                key
            ))),
        }
    }
}
