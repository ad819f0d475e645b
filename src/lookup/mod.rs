//! Lookup-table coordination for secondary entity ids.
//!
//! A range-sharded table can be addressed by a non-shard-key column (an
//! email, say) through a delegated unsharded lookup table holding
//! `(entity value, shard key)` rows. Lookup rows live and die with the
//! owning row; callers order the writes as follows:
//!
//! - insert: lookup row first, since it may mint the shard key;
//! - update: primary row first, then the lookup row;
//! - delete: primary row first, then the lookup rows.
//!
//! Entity columns sharing a lookup table share one row per owning row. The
//! lookup table of the first entity column always holds that row; other
//! lookup tables only hold one once a column they back has a value.

use std::sync::Arc;

use log::debug;

use crate::access::TableAccessor;
use crate::core::{DbError, Result, Value, column_value};
use crate::executor::Executor;
use crate::routing::RoutingParams;
use crate::schema::{LookupBinding, TableDescriptor};
use crate::statement::SelectOptions;

pub struct LookupCoordinator<'a> {
    owner: &'a TableDescriptor,
}

impl<'a> LookupCoordinator<'a> {
    pub fn new(owner: &'a TableDescriptor) -> Self {
        Self { owner }
    }

    fn binding(&self, column: &str) -> Result<&'a LookupBinding> {
        self.owner.lookup_for(column).ok_or_else(|| {
            DbError::ConfigurationError(format!(
                "table '{}' has no lookup table for entity column '{}'",
                self.owner.table_name(),
                column
            ))
        })
    }

    fn is_required(&self, binding: &LookupBinding) -> bool {
        self.owner
            .lookups()
            .first()
            .is_some_and(|first| first.table.table_name() == binding.table.table_name())
    }

    /// Non-null values in `values` of every entity column stored in the
    /// same lookup table as `binding`, in declaration order.
    pub fn lookup_row_values(&self, binding: &LookupBinding, values: &[(String, Value)]) -> Vec<(String, Value)> {
        self.owner
            .lookups()
            .iter()
            .filter(|other| other.table.table_name() == binding.table.table_name())
            .filter_map(|other| {
                column_value(values, &other.column)
                    .filter(|value| !value.is_null())
                    .map(|value| (other.column.clone(), value.clone()))
            })
            .collect()
    }

    fn lookup_accessor(&self, binding: &LookupBinding) -> TableAccessor {
        TableAccessor::new(Arc::clone(&binding.table))
    }

    /// Shard keys of every lookup row whose `column` equals `value`,
    /// in the order the lookup table returns them.
    ///
    /// Fails with `NotFoundError` when nothing matches.
    pub fn resolve_shard_keys(
        &self,
        executor: &mut dyn Executor,
        column: &str,
        value: &Value,
    ) -> Result<Vec<Value>> {
        let binding = self.binding(column)?;
        let shard_key_column = self.owner.require_shard_key_column()?;

        let result = self.lookup_accessor(binding).select_by_columns(
            executor,
            &RoutingParams::new(),
            &[(column.to_string(), value.clone())],
            Some(&[shard_key_column.to_string()]),
            &SelectOptions::default(),
        )?;

        let keys: Vec<Value> = result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|key| !key.is_null())
            .collect();
        if keys.is_empty() {
            return Err(DbError::NotFoundError(format!(
                "no '{}' row with {} = {}",
                binding.table.table_name(),
                column,
                value
            )));
        }
        debug!(
            "lookup {}.{} = {} resolved to {} shard key(s)",
            binding.table.table_name(),
            column,
            value,
            keys.len()
        );
        Ok(keys)
    }

    /// First matching shard key. Duplicate entity values are not rejected.
    pub fn resolve_shard_key(
        &self,
        executor: &mut dyn Executor,
        column: &str,
        value: &Value,
    ) -> Result<Value> {
        let mut keys = self.resolve_shard_keys(executor, column, value)?;
        Ok(keys.swap_remove(0))
    }

    /// Inserts a lookup row for `column` and returns the generated id.
    ///
    /// When `values` carries the owner's shard key, the lookup table mints
    /// the entity id and that is returned; otherwise it mints the shard key.
    /// A value supplied by the caller wins over a minted one.
    pub fn create_lookup_entry(
        &self,
        executor: &mut dyn Executor,
        column: &str,
        values: &[(String, Value)],
    ) -> Result<Value> {
        let binding = self.binding(column)?;
        let shard_key_column = self.owner.require_shard_key_column()?;
        let generated_column = match column_value(values, shard_key_column) {
            Some(key) if !key.is_null() => column,
            _ => shard_key_column,
        };

        let outcome = self.lookup_accessor(binding).insert(executor, &RoutingParams::new(), values)?;
        let supplied = column_value(values, generated_column)
            .filter(|value| !value.is_null())
            .cloned();
        let generated = supplied.or(outcome.generated_id).ok_or_else(|| {
            DbError::ExecutionError(format!(
                "lookup table '{}' did not generate '{}'",
                binding.table.table_name(),
                generated_column
            ))
        })?;

        debug!(
            "created lookup row in '{}' generating {} = {}",
            binding.table.table_name(),
            generated_column,
            generated
        );
        Ok(generated)
    }

    /// Points the lookup row of `shard_key` at `new_value`.
    ///
    /// Fails with `NotFoundError` when the shard key has no lookup row.
    pub fn update_lookup_entry(
        &self,
        executor: &mut dyn Executor,
        shard_key: &Value,
        column: &str,
        new_value: &Value,
    ) -> Result<u64> {
        let binding = self.binding(column)?;
        let shard_key_column = self.owner.require_shard_key_column()?;

        let rowcount = self.lookup_accessor(binding).update_columns(
            executor,
            &RoutingParams::new(),
            &[(shard_key_column.to_string(), shard_key.clone())],
            &[(column.to_string(), new_value.clone())],
        )?;
        if rowcount == 0 {
            return Err(DbError::NotFoundError(format!(
                "no '{}' row for {} = {}",
                binding.table.table_name(),
                shard_key_column,
                shard_key
            )));
        }
        Ok(rowcount)
    }

    /// Brings the lookup row of `shard_key` in line with a changed entity
    /// column.
    ///
    /// Outside the first lookup table a missing row means the column had
    /// no value yet, so the row is created instead.
    pub fn sync_lookup_entry(
        &self,
        executor: &mut dyn Executor,
        shard_key: &Value,
        column: &str,
        new_value: &Value,
    ) -> Result<()> {
        let binding = self.binding(column)?;
        match self.update_lookup_entry(executor, shard_key, column, new_value) {
            Ok(_) => Ok(()),
            Err(DbError::NotFoundError(_)) if !self.is_required(binding) => {
                if new_value.is_null() {
                    return Ok(());
                }
                let shard_key_column = self.owner.require_shard_key_column()?;
                self.create_lookup_entry(
                    executor,
                    column,
                    &[
                        (column.to_string(), new_value.clone()),
                        (shard_key_column.to_string(), shard_key.clone()),
                    ],
                )?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes the lookup rows of `shard_key` from every lookup table.
    ///
    /// Each lookup table is visited once even when it backs several columns.
    /// Only the first lookup table must hold a row; nothing to delete there
    /// is `NotFoundError`.
    pub fn delete_lookup_entries(&self, executor: &mut dyn Executor, shard_key: &Value) -> Result<u64> {
        let shard_key_column = self.owner.require_shard_key_column()?;
        let mut visited: Vec<&str> = Vec::new();
        let mut total = 0;

        for binding in self.owner.lookups() {
            let lookup_name = binding.table.table_name();
            if visited.contains(&lookup_name) {
                continue;
            }
            visited.push(lookup_name);

            let deleted = self.lookup_accessor(binding).delete_by_columns(
                executor,
                &RoutingParams::new(),
                &[(shard_key_column.to_string(), shard_key.clone())],
                None,
            );
            total += match deleted {
                Ok(rowcount) => rowcount,
                Err(DbError::NotFoundError(_)) if !self.is_required(binding) => 0,
                Err(err) => return Err(err),
            };
        }
        Ok(total)
    }
}
