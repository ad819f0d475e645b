use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{DbError, Result};
use crate::routing::ShardingScheme;

use super::config::{RegistryConfig, TableConfig};
use super::table::TableDescriptor;

/// Read-only catalog of table descriptors, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, Arc<TableDescriptor>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every declared table.
    ///
    /// Lookup tables are unsharded, and unsharded tables never reference
    /// lookups, so building unsharded tables first resolves every reference.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();

        let (unsharded, others): (Vec<&TableConfig>, Vec<&TableConfig>) = config
            .tables
            .iter()
            .partition(|table| table.scheme == ShardingScheme::Unsharded);

        for table in unsharded.into_iter().chain(others) {
            let descriptor = registry.build_descriptor(table)?;
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    fn build_descriptor(&self, table: &TableConfig) -> Result<TableDescriptor> {
        let mut builder = TableDescriptor::builder(&table.keyspace, &table.table, table.scheme)
            .columns(table.columns.iter().cloned())
            .transform(table.transform);
        if let Some(column) = &table.shard_key_column {
            builder = builder.shard_key_column(column);
        }
        if let Some(column) = &table.id_column {
            builder = builder.id_column(column);
        }
        if let Some(column) = &table.keyspace_id_column {
            builder = builder.keyspace_id_column(column);
        }
        for lookup in &table.lookups {
            let lookup_table = self.tables.get(&lookup.table).cloned().ok_or_else(|| {
                DbError::ConfigurationError(format!(
                    "lookup table '{}' for '{}.{}' must be an unsharded table",
                    lookup.table, table.table, lookup.column
                ))
            })?;
            builder = builder.lookup(&lookup.column, lookup_table);
        }
        builder.build()
    }

    /// Adds a table. Table names are unique across keyspaces.
    pub fn register(&mut self, descriptor: TableDescriptor) -> Result<Arc<TableDescriptor>> {
        let name = descriptor.table_name().to_string();
        if self.tables.contains_key(&name) {
            return Err(DbError::ConfigurationError(format!(
                "table '{}' is already registered",
                name
            )));
        }
        let descriptor = Arc::new(descriptor);
        self.tables.insert(name, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    pub fn get(&self, table_name: &str) -> Result<Arc<TableDescriptor>> {
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| DbError::TableNotFound(table_name.to_string()))
    }

    /// Returns every table sorted by name.
    pub fn tables(&self) -> Vec<Arc<TableDescriptor>> {
        let mut tables: Vec<_> = self.tables.values().cloned().collect();
        tables.sort_by(|a, b| a.table_name().cmp(b.table_name()));
        tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
