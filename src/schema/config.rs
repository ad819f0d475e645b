use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result};
use crate::routing::ShardingScheme;

use super::policy::ShardKeyTransform;

/// Lookup binding as written in configuration: the lookup table is
/// referenced by name and must be declared in the same registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    pub column: String,
    pub table: String,
}

/// Table declaration
///
/// Mirrors [`TableDescriptor`](super::TableDescriptor) with lookup tables
/// referenced by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub keyspace: String,
    pub table: String,
    pub columns: Vec<String>,
    pub scheme: ShardingScheme,
    #[serde(default)]
    pub shard_key_column: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub keyspace_id_column: Option<String>,
    #[serde(default)]
    pub transform: ShardKeyTransform,
    #[serde(default)]
    pub lookups: Vec<LookupConfig>,
}

impl TableConfig {
    /// Create a new table declaration
    pub fn new(keyspace: &str, table: &str, scheme: ShardingScheme) -> Self {
        Self {
            keyspace: keyspace.to_string(),
            table: table.to_string(),
            columns: Vec::new(),
            scheme,
            shard_key_column: None,
            id_column: None,
            keyspace_id_column: None,
            transform: ShardKeyTransform::default(),
            lookups: Vec::new(),
        }
    }

    /// Set the column list
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the sharding key column
    pub fn shard_key_column(mut self, column: &str) -> Self {
        self.shard_key_column = Some(column.to_string());
        self
    }

    /// Set the store-minted id column
    pub fn id_column(mut self, column: &str) -> Self {
        self.id_column = Some(column.to_string());
        self
    }

    /// Set the keyspace id column
    pub fn keyspace_id_column(mut self, column: &str) -> Self {
        self.keyspace_id_column = Some(column.to_string());
        self
    }

    /// Set the key transform
    pub fn transform(mut self, transform: ShardKeyTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Bind an entity column to a lookup table
    pub fn lookup(mut self, column: &str, table: &str) -> Self {
        self.lookups.push(LookupConfig {
            column: column.to_string(),
            table: table.to_string(),
        });
        self
    }
}

/// Registry configuration
///
/// Loaded from JSON:
///
/// ```json
/// { "tables": [
///     { "keyspace": "user", "table": "email_user_map", "scheme": "unsharded",
///       "columns": ["email", "user_id"], "id_column": "user_id" },
///     { "keyspace": "user", "table": "users", "scheme": "range_sharded_with_lookup",
///       "columns": ["user_id", "email", "keyspace_id"],
///       "shard_key_column": "user_id", "keyspace_id_column": "keyspace_id",
///       "lookups": [{ "column": "email", "table": "email_user_map" }] }
/// ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table declaration
    pub fn table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Parse from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            DbError::ConfigurationError(format!(
                "cannot read registry config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration
    ///
    /// Structural checks only; per-table rules are enforced when the
    /// descriptors are built.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for table in &self.tables {
            if table.table.trim().is_empty() {
                return Err(DbError::ConfigurationError(
                    "table name cannot be empty".to_string(),
                ));
            }
            if table.keyspace.trim().is_empty() {
                return Err(DbError::ConfigurationError(format!(
                    "keyspace for table '{}' cannot be empty",
                    table.table
                )));
            }
            if !names.insert(table.table.as_str()) {
                return Err(DbError::ConfigurationError(format!(
                    "table '{}' is declared more than once",
                    table.table
                )));
            }
        }

        for table in &self.tables {
            for lookup in &table.lookups {
                if !names.contains(lookup.table.as_str()) {
                    return Err(DbError::ConfigurationError(format!(
                        "table '{}' references undeclared lookup table '{}'",
                        table.table, lookup.table
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_pattern() {
        let config = TableConfig::new("user", "users", ShardingScheme::RangeSharded)
            .columns(&["user_id", "name"])
            .shard_key_column("user_id")
            .transform(ShardKeyTransform::Fnv1a);

        assert_eq!(config.columns, vec!["user_id", "name"]);
        assert_eq!(config.shard_key_column.as_deref(), Some("user_id"));
        assert_eq!(config.transform, ShardKeyTransform::Fnv1a);
        assert!(config.lookups.is_empty());
    }

    #[test]
    fn test_defaults_when_fields_omitted() {
        let config = RegistryConfig::from_json_str(
            r#"{"tables": [{"keyspace": "main", "table": "settings", "scheme": "unsharded", "columns": ["name", "value"]}]}"#,
        )
        .unwrap();

        let table = &config.tables[0];
        assert_eq!(table.transform, ShardKeyTransform::Identity);
        assert!(table.shard_key_column.is_none());
        assert!(table.lookups.is_empty());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_dangling_lookups() {
        let duplicate = RegistryConfig::new()
            .table(TableConfig::new("a", "t", ShardingScheme::Unsharded).columns(&["id"]))
            .table(TableConfig::new("b", "t", ShardingScheme::Unsharded).columns(&["id"]));
        assert!(duplicate.validate().is_err());

        let dangling = RegistryConfig::new().table(
            TableConfig::new("user", "users", ShardingScheme::RangeSharded)
                .columns(&["user_id", "email"])
                .shard_key_column("user_id")
                .lookup("email", "missing_map"),
        );
        let err = dangling.validate().unwrap_err();
        assert!(err.to_string().contains("missing_map"));
    }

    #[test]
    fn test_unknown_scheme_is_a_serialization_error() {
        let err = RegistryConfig::from_json_str(
            r#"{"tables": [{"keyspace": "k", "table": "t", "scheme": "hashed", "columns": ["id"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::SerializationError(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let config = RegistryConfig::new().table(
            TableConfig::new("user", "users", ShardingScheme::RangeSharded)
                .columns(&["user_id"])
                .shard_key_column("user_id"),
        );
        let json = config.to_json().unwrap();
        assert_eq!(RegistryConfig::from_json_str(&json).unwrap(), config);
    }
}
