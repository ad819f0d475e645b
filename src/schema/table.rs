use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{DbError, Result, Value};
use crate::routing::{KeyspaceId, ShardingScheme};

use super::policy::{ShardKeyPolicy, ShardKeyTransform};

/// A secondary-entity column resolved through a delegated lookup table.
#[derive(Debug, Clone)]
pub struct LookupBinding {
    pub column: String,
    pub table: Arc<TableDescriptor>,
}

/// Static description of a table and how it is sharded.
///
/// Built once at configuration time and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    keyspace: String,
    table_name: String,
    columns: Vec<String>,
    scheme: ShardingScheme,
    shard_key_column: Option<String>,
    id_column: Option<String>,
    keyspace_id_column: Option<String>,
    lookups: Vec<LookupBinding>,
    key_policy: Arc<dyn ShardKeyPolicy>,
}

impl TableDescriptor {
    pub fn builder(
        keyspace: impl Into<String>,
        table_name: impl Into<String>,
        scheme: ShardingScheme,
    ) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            keyspace: keyspace.into(),
            table_name: table_name.into(),
            scheme,
            columns: Vec::new(),
            shard_key_column: None,
            id_column: None,
            keyspace_id_column: None,
            lookups: Vec::new(),
            key_policy: Arc::new(ShardKeyTransform::default()),
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn scheme(&self) -> ShardingScheme {
        self.scheme
    }

    pub fn shard_key_column(&self) -> Option<&str> {
        self.shard_key_column.as_deref()
    }

    /// Column whose value is minted by the backing store on insert.
    pub fn id_column(&self) -> Option<&str> {
        self.id_column.as_deref()
    }

    pub fn keyspace_id_column(&self) -> Option<&str> {
        self.keyspace_id_column.as_deref()
    }

    pub fn lookups(&self) -> &[LookupBinding] {
        &self.lookups
    }

    pub fn lookup_for(&self, column: &str) -> Option<&LookupBinding> {
        self.lookups.iter().find(|binding| binding.column == column)
    }

    pub fn key_policy(&self) -> &dyn ShardKeyPolicy {
        self.key_policy.as_ref()
    }

    /// Shard-key column name, failing for schemes that have none.
    pub fn require_shard_key_column(&self) -> Result<&str> {
        self.shard_key_column().ok_or_else(|| {
            DbError::ConfigurationError(format!(
                "table '{}' ({}) has no sharding key column",
                self.table_name, self.scheme
            ))
        })
    }

    /// Fails with `ValidationError` when the table policy rejects `key`.
    pub fn validate_shard_key(&self, key: &Value) -> Result<()> {
        if self.key_policy.is_sharding_key_valid(key) {
            Ok(())
        } else {
            Err(DbError::ValidationError(format!(
                "Invalid sharding_key {} for table '{}'",
                key, self.table_name
            )))
        }
    }

    pub fn keyspace_id_for(&self, key: &Value) -> Result<KeyspaceId> {
        self.validate_shard_key(key)?;
        self.key_policy.sharding_key_to_keyspace_id(key)
    }
}

pub struct TableDescriptorBuilder {
    keyspace: String,
    table_name: String,
    scheme: ShardingScheme,
    columns: Vec<String>,
    shard_key_column: Option<String>,
    id_column: Option<String>,
    keyspace_id_column: Option<String>,
    lookups: Vec<LookupBinding>,
    key_policy: Arc<dyn ShardKeyPolicy>,
}

impl TableDescriptorBuilder {
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn shard_key_column(mut self, column: impl Into<String>) -> Self {
        self.shard_key_column = Some(column.into());
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    pub fn keyspace_id_column(mut self, column: impl Into<String>) -> Self {
        self.keyspace_id_column = Some(column.into());
        self
    }

    pub fn lookup(mut self, column: impl Into<String>, table: Arc<TableDescriptor>) -> Self {
        self.lookups.push(LookupBinding {
            column: column.into(),
            table,
        });
        self
    }

    pub fn transform(mut self, transform: ShardKeyTransform) -> Self {
        self.key_policy = Arc::new(transform);
        self
    }

    pub fn key_policy(mut self, policy: Arc<dyn ShardKeyPolicy>) -> Self {
        self.key_policy = policy;
        self
    }

    /// Validates and freezes the descriptor.
    ///
    /// Checks for:
    /// - non-empty keyspace, table and column names without duplicates,
    /// - a shard-key column on range-sharded tables and none elsewhere,
    /// - lookup bindings on declared columns, backed by unsharded tables
    ///   that carry both the entity column and the owner's shard-key column.
    pub fn build(self) -> Result<TableDescriptor> {
        let table = self.table_name.as_str();
        if self.keyspace.trim().is_empty() {
            return Err(DbError::ConfigurationError(format!(
                "keyspace for table '{}' must not be empty",
                table
            )));
        }
        if table.trim().is_empty() {
            return Err(DbError::ConfigurationError(
                "table name must not be empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(DbError::ConfigurationError(format!(
                "DB class should define columns_list: table '{}' has no columns",
                table
            )));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.trim().is_empty() {
                return Err(DbError::ConfigurationError(format!(
                    "table '{}' has an empty column name",
                    table
                )));
            }
            if !seen.insert(column.as_str()) {
                return Err(DbError::ConfigurationError(format!(
                    "column '{}' appears more than once in table '{}'",
                    column, table
                )));
            }
        }

        let declared = |column: &Option<String>, role: &str| -> Result<()> {
            match column {
                Some(name) if !seen.contains(name.as_str()) => Err(DbError::ConfigurationError(
                    format!("{} column '{}' is not a column of table '{}'", role, name, table),
                )),
                _ => Ok(()),
            }
        };
        declared(&self.shard_key_column, "sharding key")?;
        declared(&self.id_column, "id")?;
        declared(&self.keyspace_id_column, "keyspace id")?;

        if self.scheme.is_range_sharded() {
            if self.shard_key_column.is_none() {
                return Err(DbError::ConfigurationError(format!(
                    "sharding_key_column_name empty for range-sharded table '{}'",
                    table
                )));
            }
        } else {
            if self.shard_key_column.is_some() || self.keyspace_id_column.is_some() {
                return Err(DbError::ConfigurationError(format!(
                    "{} table '{}' cannot declare a sharding key or keyspace id column",
                    self.scheme, table
                )));
            }
            if !self.lookups.is_empty() {
                return Err(DbError::ConfigurationError(format!(
                    "{} table '{}' cannot declare lookup tables",
                    self.scheme, table
                )));
            }
        }

        if self.scheme.maintains_lookups() && self.lookups.is_empty() {
            return Err(DbError::ConfigurationError(format!(
                "entity_id_lookup_map empty for table '{}'",
                table
            )));
        }

        let mut bound = HashSet::new();
        for binding in &self.lookups {
            let column = binding.column.as_str();
            if !seen.contains(column) {
                return Err(DbError::ConfigurationError(format!(
                    "lookup column '{}' is not a column of table '{}'",
                    column, table
                )));
            }
            if !bound.insert(column) {
                return Err(DbError::ConfigurationError(format!(
                    "lookup column '{}' is bound more than once in table '{}'",
                    column, table
                )));
            }
            if Some(column) == self.shard_key_column.as_deref() {
                return Err(DbError::ConfigurationError(format!(
                    "sharding key column '{}' cannot be a lookup column",
                    column
                )));
            }
            let lookup = binding.table.as_ref();
            if lookup.scheme() != ShardingScheme::Unsharded {
                return Err(DbError::ConfigurationError(format!(
                    "lookup table '{}' for column '{}' must be unsharded, found {}",
                    lookup.table_name(),
                    column,
                    lookup.scheme()
                )));
            }
            if !lookup.has_column(column) {
                return Err(DbError::ConfigurationError(format!(
                    "lookup table '{}' has no column '{}'",
                    lookup.table_name(),
                    column
                )));
            }
            if let Some(shard_key) = self.shard_key_column.as_deref() {
                if !lookup.has_column(shard_key) {
                    return Err(DbError::ConfigurationError(format!(
                        "lookup table '{}' has no sharding key column '{}'",
                        lookup.table_name(),
                        shard_key
                    )));
                }
            }
        }

        Ok(TableDescriptor {
            keyspace: self.keyspace,
            table_name: self.table_name,
            columns: self.columns,
            scheme: self.scheme,
            shard_key_column: self.shard_key_column,
            id_column: self.id_column,
            keyspace_id_column: self.keyspace_id_column,
            lookups: self.lookups,
            key_policy: self.key_policy,
        })
    }
}
