use std::fmt;

use serde::{Deserialize, Serialize};

use super::key_range::KeyRange;
use crate::core::Value;

/// How a table's rows are spread over shards. Fixed per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingScheme {
    Unsharded,
    RangeSharded,
    RangeShardedWithLookup,
    CustomSharded,
}

impl ShardingScheme {
    pub fn is_range_sharded(&self) -> bool {
        matches!(self, Self::RangeSharded | Self::RangeShardedWithLookup)
    }

    /// Whether writes must keep delegated lookup tables in sync.
    pub fn maintains_lookups(&self) -> bool {
        matches!(self, Self::RangeShardedWithLookup)
    }
}

impl fmt::Display for ShardingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsharded => "unsharded",
            Self::RangeSharded => "range_sharded",
            Self::RangeShardedWithLookup => "range_sharded_with_lookup",
            Self::CustomSharded => "custom_sharded",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Select)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Secondary-key values resolved to shard keys through a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLookup {
    pub column: String,
    /// One `(secondary value, shard key)` pair per matching lookup row.
    pub resolved: Vec<(Value, Value)>,
}

/// Where a single logical operation must be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingDecision {
    ByKeyRange(KeyRange),
    ByShardKeys(Vec<Value>),
    ByEntityLookup(EntityLookup),
    ByShardName(Vec<String>),
}

impl RoutingDecision {
    /// Shard keys the operation is dispatched with, deduplicated in order.
    ///
    /// Returns `None` for range and shard-name decisions.
    pub fn effective_shard_keys(&self) -> Option<Vec<&Value>> {
        let keys: Vec<&Value> = match self {
            Self::ByShardKeys(keys) => keys.iter().collect(),
            Self::ByEntityLookup(lookup) => lookup.resolved.iter().map(|(_, key)| key).collect(),
            Self::ByKeyRange(_) | Self::ByShardName(_) => return None,
        };
        let mut deduped: Vec<&Value> = Vec::with_capacity(keys.len());
        for key in keys {
            if !deduped.contains(&key) {
                deduped.push(key);
            }
        }
        Some(deduped)
    }

    /// Number of physical destinations the decision names.
    ///
    /// `None` means an open-ended set of shards: any key range on a sharded
    /// keyspace. An unsharded keyspace has exactly one shard, so its full
    /// range counts as one destination.
    pub fn destination_count(&self, scheme: ShardingScheme) -> Option<usize> {
        match self {
            Self::ByKeyRange(_) if scheme == ShardingScheme::Unsharded => Some(1),
            Self::ByKeyRange(_) => None,
            Self::ByShardName(names) => Some(names.len()),
            Self::ByShardKeys(_) | Self::ByEntityLookup(_) => {
                self.effective_shard_keys().map(|keys| keys.len())
            }
        }
    }

    pub fn is_single_destination(&self, scheme: ShardingScheme) -> bool {
        self.destination_count(scheme) == Some(1)
    }
}

impl fmt::Display for RoutingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByKeyRange(range) => write!(f, "key range {}", range),
            Self::ByShardKeys(keys) => {
                let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
                write!(f, "shard keys [{}]", keys.join(", "))
            }
            Self::ByEntityLookup(lookup) => {
                let pairs: Vec<String> = lookup
                    .resolved
                    .iter()
                    .map(|(entity, key)| format!("{} -> {}", entity, key))
                    .collect();
                write!(f, "entity lookup on {} [{}]", lookup.column, pairs.join(", "))
            }
            Self::ByShardName(names) => write!(f, "shard names [{}]", names.join(", ")),
        }
    }
}
