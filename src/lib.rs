// ============================================================================
// shardroute Library
// ============================================================================

pub mod access;
pub mod core;
pub mod executor;
pub mod lookup;
pub mod result;
pub mod routing;
pub mod rpc;
pub mod schema;
pub mod statement;

use std::sync::Arc;

// Re-export main types for convenience
pub use access::{DispatchDescriptor, DispatchTarget, InsertOutcome, TableAccessor};
pub use core::{ColumnValues, DbError, Result, Value, WriteStep, column_values};
pub use executor::{Executor, InMemoryExecutor, TransactionScope, with_transaction};
pub use lookup::LookupCoordinator;
pub use result::{DbRow, QueryResult};
pub use routing::{
    KeyRange, KeyspaceId, OperationKind, RoutingDecision, RoutingParams, ShardResolver,
    ShardingScheme,
};
pub use rpc::{CallerId, ErrorCode, RpcError};
pub use schema::{RegistryConfig, TableConfig, TableDescriptor, TableRegistry};

// ============================================================================
// Client API
// ============================================================================

/// Entry point for routed access to a set of configured tables.
///
/// The client owns the table registry and the caller identity; the
/// executor is passed per call so that one client can serve several
/// connections.
///
/// # Examples
///
/// ```
/// use shardroute::{
///     InMemoryExecutor, RegistryConfig, RoutingParams, ShardedClient, ShardingScheme,
///     TableConfig, Value,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RegistryConfig::new().table(
///     TableConfig::new("user", "users", ShardingScheme::RangeSharded)
///         .columns(&["user_id", "name"])
///         .shard_key_column("user_id"),
/// );
/// let client = ShardedClient::from_config(&config)?;
///
/// let mut executor = InMemoryExecutor::new();
/// executor.create_table("users", None)?;
///
/// let users = client.accessor("users")?;
/// users.insert(
///     &mut executor,
///     &RoutingParams::new(),
///     &[("user_id".into(), Value::Integer(7)), ("name".into(), "Ann".into())],
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ShardedClient {
    registry: Arc<TableRegistry>,
    caller_id: Option<CallerId>,
}

impl ShardedClient {
    pub fn new(registry: TableRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            caller_id: None,
        }
    }

    /// Builds the registry from a validated configuration.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        Ok(Self::new(TableRegistry::from_config(config)?))
    }

    /// Attaches `caller_id` to every statement dispatched through this client.
    pub fn with_caller_id(mut self, caller_id: CallerId) -> Self {
        self.caller_id = Some(caller_id);
        self
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn caller_id(&self) -> Option<&CallerId> {
        self.caller_id.as_ref()
    }

    pub fn accessor(&self, table: &str) -> Result<TableAccessor> {
        let accessor = TableAccessor::new(self.registry.get(table)?);
        Ok(match &self.caller_id {
            Some(caller_id) => accessor.with_caller_id(caller_id.clone()),
            None => accessor,
        })
    }

    /// Resolves routing for `table` without building a statement.
    pub fn resolve(
        &self,
        executor: &mut dyn Executor,
        table: &str,
        op: OperationKind,
        params: &RoutingParams,
    ) -> Result<RoutingDecision> {
        let descriptor = self.registry.get(table)?;
        ShardResolver::new(&descriptor).resolve(executor, op, params)
    }
}
