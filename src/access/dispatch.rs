use serde::Serialize;

use crate::core::{Result, Value};
use crate::routing::{KeyRange, KeyspaceId, OperationKind, RoutingDecision};
use crate::rpc::CallerId;
use crate::schema::TableDescriptor;
use crate::statement::Statement;

/// Destinations in the form the routing tier accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTarget {
    KeyspaceIds(Vec<KeyspaceId>),
    KeyRanges(Vec<KeyRange>),
    ShardNames(Vec<String>),
}

impl DispatchTarget {
    /// Maps a decision onto routing-tier destinations. Shard keys go through
    /// the table's key policy; duplicates collapse.
    pub fn from_decision(table: &TableDescriptor, decision: &RoutingDecision) -> Result<Self> {
        match decision {
            RoutingDecision::ByKeyRange(range) => Ok(Self::KeyRanges(vec![*range])),
            RoutingDecision::ByShardName(names) => Ok(Self::ShardNames(names.clone())),
            RoutingDecision::ByShardKeys(_) | RoutingDecision::ByEntityLookup(_) => {
                let mut ids = Vec::new();
                for key in decision.effective_shard_keys().unwrap_or_default() {
                    let kid = table.keyspace_id_for(key)?;
                    if !ids.contains(&kid) {
                        ids.push(kid);
                    }
                }
                Ok(Self::KeyspaceIds(ids))
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::KeyspaceIds(ids) => ids.len(),
            Self::KeyRanges(ranges) => ranges.len(),
            Self::ShardNames(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the routing tier needs to run one statement.
#[derive(Debug, Clone)]
pub struct DispatchDescriptor {
    pub keyspace: String,
    pub table: String,
    pub kind: OperationKind,
    pub statement: Statement,
    pub decision: RoutingDecision,
    pub target: DispatchTarget,
    /// Id minted by the insert, filled in after dispatch.
    pub generated_id: Option<Value>,
    pub caller_id: Option<CallerId>,
}
