use std::sync::Arc;

use log::{debug, warn};

use super::dispatch::{DispatchDescriptor, DispatchTarget};
use crate::core::{DbError, Result, Value, WriteStep, column_value, set_column_value};
use crate::executor::Executor;
use crate::lookup::LookupCoordinator;
use crate::result::QueryResult;
use crate::routing::{OperationKind, RoutingDecision, RoutingParams, ShardResolver, single_shard_key};
use crate::rpc::CallerId;
use crate::schema::TableDescriptor;
use crate::statement::{self, SelectOptions};

#[derive(Debug, Clone)]
pub struct InsertOutcome {
    /// Id generated during the insert: a shard key or entity id minted by a
    /// lookup table, or the auto-increment id of an unsharded table.
    pub generated_id: Option<Value>,
    pub descriptor: DispatchDescriptor,
}

/// Routed reads and writes against one table.
///
/// Every operation resolves routing first and builds the statement second,
/// so a rejected routing never produces a dispatch. On tables with lookup
/// maintenance the writes are coordinated with [`LookupCoordinator`].
#[derive(Debug, Clone)]
pub struct TableAccessor {
    table: Arc<TableDescriptor>,
    caller_id: Option<CallerId>,
}

impl TableAccessor {
    pub fn new(table: Arc<TableDescriptor>) -> Self {
        Self {
            table,
            caller_id: None,
        }
    }

    pub fn with_caller_id(mut self, caller_id: CallerId) -> Self {
        self.caller_id = Some(caller_id);
        self
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    fn check_columns<'c>(&self, columns: impl IntoIterator<Item = &'c str>) -> Result<()> {
        for column in columns {
            if !self.table.has_column(column) {
                return Err(DbError::ConfigurationError(format!(
                    "column '{}' is not declared on table '{}'",
                    column,
                    self.table.table_name()
                )));
            }
        }
        Ok(())
    }

    /// Routes by the shard key carried in `pairs` when the caller gave no
    /// routing parameters at all.
    fn effective_params(&self, params: &RoutingParams, pairs: &[(String, Value)]) -> Result<RoutingParams> {
        let mut params = params.clone();
        let Some(column) = self.table.shard_key_column() else {
            return Ok(params);
        };
        let Some(carried) = column_value(pairs, column).filter(|v| !v.is_null()) else {
            return Ok(params);
        };

        if params.is_empty() {
            params.shard_keys.push(carried.clone());
        } else if params.shard_keys.len() == 1 && params.shard_keys[0] != *carried {
            return Err(DbError::ConfigurationError(format!(
                "sharding_key {} conflicts with {} = {} on table '{}'",
                params.shard_keys[0],
                column,
                carried,
                self.table.table_name()
            )));
        }
        Ok(params)
    }

    fn resolve(&self, executor: &mut dyn Executor, op: OperationKind, params: &RoutingParams) -> Result<RoutingDecision> {
        ShardResolver::new(&self.table).resolve(executor, op, params)
    }

    /// Stored keyspace id for a single-key write, when the table keeps one.
    fn keyspace_id_value(&self, decision: &RoutingDecision) -> Result<Option<(&str, Value)>> {
        match self.table.keyspace_id_column() {
            Some(column) if self.table.scheme().is_range_sharded() => {
                let key = single_shard_key(decision)?;
                let kid = self.table.keyspace_id_for(&key)?;
                Ok(Some((column, Value::from(kid))))
            }
            _ => Ok(None),
        }
    }

    fn check_stored_keyspace_id(&self, column: &str, kid: &Value, values: &[(String, Value)]) -> Result<()> {
        let conflicting = column_value(values, column)
            .filter(|v| !v.is_null())
            .is_some_and(|v| v != kid);
        if conflicting {
            return Err(DbError::ValidationError(format!(
                "{} does not match the keyspace id {} of the sharding key on '{}'",
                column,
                kid,
                self.table.table_name()
            )));
        }
        Ok(())
    }

    fn descriptor(&self, statement: statement::Statement, decision: RoutingDecision) -> Result<DispatchDescriptor> {
        let target = DispatchTarget::from_decision(&self.table, &decision)?;
        Ok(DispatchDescriptor {
            keyspace: self.table.keyspace().to_string(),
            table: self.table.table_name().to_string(),
            kind: statement.kind,
            statement,
            decision,
            target,
            generated_id: None,
            caller_id: self.caller_id.clone(),
        })
    }

    fn dispatch(&self, executor: &mut dyn Executor, descriptor: &DispatchDescriptor) -> Result<u64> {
        debug!(
            "dispatching {} on {}.{} to {:?} (caller {})",
            descriptor.kind,
            descriptor.keyspace,
            descriptor.table,
            descriptor.target,
            descriptor
                .caller_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string())
        );
        executor.dispatch(descriptor)
    }

    fn partial_write(&self, shard_key: &Value, step: WriteStep, err: DbError) -> DbError {
        warn!(
            "{} on '{}' failed for sharding key {} after an earlier step committed: {}",
            step,
            self.table.table_name(),
            shard_key,
            err
        );
        DbError::partial_write(self.table.table_name(), shard_key.clone(), step, err)
    }

    // ------------------------------------------------------------------
    // Select
    // ------------------------------------------------------------------

    /// Resolves and builds a select. `columns` defaults to every declared
    /// column.
    pub fn plan_select(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        columns: Option<&[String]>,
        options: &SelectOptions,
    ) -> Result<DispatchDescriptor> {
        let columns: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => self.table.columns().to_vec(),
        };
        self.check_columns(
            columns
                .iter()
                .map(String::as_str)
                .chain(predicates.iter().map(|(c, _)| c.as_str()))
                .chain(options.order_by.iter().map(|o| o.column.as_str()))
                .chain(options.group_by.iter().map(String::as_str)),
        )?;

        let params = self.effective_params(params, predicates)?;
        let decision = self.resolve(executor, OperationKind::Select, &params)?;
        let statement =
            statement::select_by_columns_query(&columns, self.table.table_name(), predicates, options)?;
        self.descriptor(statement, decision)
    }

    pub fn select_by_columns(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        columns: Option<&[String]>,
        options: &SelectOptions,
    ) -> Result<QueryResult> {
        let descriptor = self.plan_select(executor, params, predicates, columns, options)?;
        self.dispatch(executor, &descriptor)?;
        let rows = executor.fetch_all()?;
        Ok(QueryResult::new(descriptor.statement.columns, rows))
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Resolves and builds a plain insert.
    ///
    /// On range-sharded tables the row is completed with its shard key and,
    /// when the table stores one, its keyspace id.
    pub fn plan_insert(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        values: &[(String, Value)],
    ) -> Result<DispatchDescriptor> {
        self.check_columns(values.iter().map(|(c, _)| c.as_str()))?;
        let params = self.effective_params(params, values)?;
        let decision = self.resolve(executor, OperationKind::Insert, &params)?;

        let mut values = values.to_vec();
        if self.table.scheme().is_range_sharded() {
            let key = single_shard_key(&decision)?;
            let column = self.table.require_shard_key_column()?;
            if column_value(&values, column).is_none_or(Value::is_null) {
                set_column_value(&mut values, column, key);
            }

            if let Some((kid_column, kid)) = self.keyspace_id_value(&decision)? {
                self.check_stored_keyspace_id(kid_column, &kid, &values)?;
                set_column_value(&mut values, kid_column, kid);
            }
        }

        let statement = statement::insert_query(self.table.table_name(), &values)?;
        self.descriptor(statement, decision)
    }

    /// Inserts one row.
    ///
    /// With lookup maintenance the lookup rows are written first, minting
    /// the shard key or the entity id when the row lacks one, then the
    /// primary row. A primary failure after that is a partial write.
    pub fn insert(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        values: &[(String, Value)],
    ) -> Result<InsertOutcome> {
        if self.table.scheme().maintains_lookups() {
            return self.insert_with_lookups(executor, params, values);
        }

        let mut descriptor = self.plan_insert(executor, params, values)?;
        self.dispatch(executor, &descriptor)?;
        descriptor.generated_id = executor.last_insert_id().map(Value::Integer);
        Ok(InsertOutcome {
            generated_id: descriptor.generated_id.clone(),
            descriptor,
        })
    }

    fn insert_with_lookups(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        values: &[(String, Value)],
    ) -> Result<InsertOutcome> {
        let table = self.table.table_name();
        self.check_columns(values.iter().map(|(c, _)| c.as_str()))?;
        let shard_key_column = self.table.require_shard_key_column()?;
        let carried = column_value(values, shard_key_column)
            .filter(|v| !v.is_null())
            .cloned();
        let known_key = if params.is_empty() {
            carried
        } else {
            let decision = self.resolve(executor, OperationKind::Insert, params)?;
            let key = single_shard_key(&decision)?;
            if let Some(carried) = carried.filter(|carried| *carried != key) {
                return Err(DbError::ConfigurationError(format!(
                    "sharding_key {} conflicts with {} = {} on table '{}'",
                    key, shard_key_column, carried, table
                )));
            }
            Some(key)
        };
        if let Some(key) = &known_key {
            self.table.validate_shard_key(key)?;
            if let Some(kid_column) = self.table.keyspace_id_column() {
                let kid = Value::from(self.table.keyspace_id_for(key)?);
                self.check_stored_keyspace_id(kid_column, &kid, values)?;
            }
        }

        let (primary, secondary) = self.table.lookups().split_first().ok_or_else(|| {
            DbError::ConfigurationError(format!("entity_id_lookup_map empty for table '{}'", table))
        })?;
        let coordinator = LookupCoordinator::new(&self.table);
        let mut values = values.to_vec();
        let entity = column_value(&values, &primary.column)
            .filter(|v| !v.is_null())
            .cloned();
        let mut primary_row = coordinator.lookup_row_values(primary, &values);

        let (shard_key, generated_id) = match (known_key, entity) {
            (None, None) => {
                return Err(DbError::ConfigurationError(format!(
                    "For sharded table '{}', sharding_key and entity_id cannot both be empty.",
                    table
                )));
            }
            (Some(key), Some(_)) => {
                primary_row.push((shard_key_column.to_string(), key.clone()));
                coordinator.create_lookup_entry(executor, &primary.column, &primary_row)?;
                (key, None)
            }
            (Some(key), None) => {
                primary_row.push((shard_key_column.to_string(), key.clone()));
                let entity = coordinator.create_lookup_entry(executor, &primary.column, &primary_row)?;
                set_column_value(&mut values, &primary.column, entity.clone());
                (key, Some(entity))
            }
            (None, Some(_)) => {
                let key = coordinator.create_lookup_entry(executor, &primary.column, &primary_row)?;
                set_column_value(&mut values, shard_key_column, key.clone());
                (key.clone(), Some(key))
            }
        };

        // One row per remaining lookup table, only when a column it backs is set.
        let mut visited = vec![primary.table.table_name()];
        for binding in secondary {
            let lookup_name = binding.table.table_name();
            if visited.contains(&lookup_name) {
                continue;
            }
            visited.push(lookup_name);

            let mut row = coordinator.lookup_row_values(binding, &values);
            let Some(first_column) = row.first().map(|(column, _)| column.clone()) else {
                continue;
            };
            row.push((shard_key_column.to_string(), shard_key.clone()));
            if let Err(err) = coordinator.create_lookup_entry(executor, &first_column, &row) {
                return Err(self.partial_write(&shard_key, WriteStep::CreateLookup, err));
            }
        }

        let routed = RoutingParams::new().shard_key(shard_key.clone());
        let primary_insert = self
            .plan_insert(executor, &routed, &values)
            .and_then(|descriptor| self.dispatch(executor, &descriptor).map(|_| descriptor));
        let mut descriptor = match primary_insert {
            Ok(descriptor) => descriptor,
            Err(err) => return Err(self.partial_write(&shard_key, WriteStep::PrimaryInsert, err)),
        };

        descriptor.generated_id = generated_id.clone();
        Ok(InsertOutcome {
            generated_id,
            descriptor,
        })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn plan_update(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        updates: &[(String, Value)],
    ) -> Result<DispatchDescriptor> {
        statement::require_predicates(OperationKind::Update, self.table.table_name(), predicates)?;
        self.check_columns(
            predicates
                .iter()
                .chain(updates.iter())
                .map(|(c, _)| c.as_str()),
        )?;
        for column in [self.table.shard_key_column(), self.table.keyspace_id_column()]
            .into_iter()
            .flatten()
        {
            if column_value(updates, column).is_some() {
                return Err(DbError::ValidationError(format!(
                    "column '{}' of '{}' routes the row and cannot be updated",
                    column,
                    self.table.table_name()
                )));
            }
        }

        let params = self.effective_params(params, predicates)?;
        let decision = self.resolve(executor, OperationKind::Update, &params)?;
        let mut predicates = predicates.to_vec();
        if let Some((column, kid)) = self.keyspace_id_value(&decision)? {
            if column_value(&predicates, column).is_none() {
                predicates.push((column.to_string(), kid));
            }
        }

        let statement = statement::update_columns_query(self.table.table_name(), &predicates, updates)?;
        self.descriptor(statement, decision)
    }

    /// Updates matching rows and returns the affected count.
    ///
    /// When a lookup column changes, the lookup row follows the primary
    /// update; a primary update touching no rows is `NotFoundError` and
    /// leaves the lookup alone.
    pub fn update_columns(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        updates: &[(String, Value)],
    ) -> Result<u64> {
        let descriptor = self.plan_update(executor, params, predicates, updates)?;
        let rowcount = self.dispatch(executor, &descriptor)?;
        if !self.table.scheme().maintains_lookups() {
            return Ok(rowcount);
        }

        let changed: Vec<&(String, Value)> = updates
            .iter()
            .filter(|(column, _)| self.table.lookup_for(column).is_some())
            .collect();
        if changed.is_empty() {
            return Ok(rowcount);
        }
        if rowcount == 0 {
            return Err(DbError::NotFoundError(format!(
                "DB Row not found: no '{}' row matched, lookup left unchanged",
                self.table.table_name()
            )));
        }

        let shard_key = single_shard_key(&descriptor.decision)?;
        let coordinator = LookupCoordinator::new(&self.table);
        for (column, value) in changed {
            if let Err(err) = coordinator.sync_lookup_entry(executor, &shard_key, column, value) {
                return Err(self.partial_write(&shard_key, WriteStep::UpdateLookup, err));
            }
        }
        Ok(rowcount)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn plan_delete(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        limit: Option<usize>,
    ) -> Result<DispatchDescriptor> {
        statement::require_predicates(OperationKind::Delete, self.table.table_name(), predicates)?;
        self.check_columns(predicates.iter().map(|(c, _)| c.as_str()))?;

        let params = self.effective_params(params, predicates)?;
        let decision = self.resolve(executor, OperationKind::Delete, &params)?;
        let mut predicates = predicates.to_vec();
        if let Some((column, kid)) = self.keyspace_id_value(&decision)? {
            if column_value(&predicates, column).is_none() {
                predicates.push((column.to_string(), kid));
            }
        }

        let statement = statement::delete_by_columns_query(self.table.table_name(), &predicates, limit)?;
        self.descriptor(statement, decision)
    }

    /// Deletes matching rows, then their lookup rows.
    ///
    /// Deleting nothing is `NotFoundError`.
    pub fn delete_by_columns(
        &self,
        executor: &mut dyn Executor,
        params: &RoutingParams,
        predicates: &[(String, Value)],
        limit: Option<usize>,
    ) -> Result<u64> {
        let descriptor = self.plan_delete(executor, params, predicates, limit)?;
        let rowcount = self.dispatch(executor, &descriptor)?;
        if rowcount == 0 {
            return Err(DbError::NotFoundError(format!(
                "DB Row not found in '{}'",
                self.table.table_name()
            )));
        }

        if self.table.scheme().maintains_lookups() {
            let shard_key = single_shard_key(&descriptor.decision)?;
            if let Err(err) = LookupCoordinator::new(&self.table).delete_lookup_entries(executor, &shard_key) {
                return Err(self.partial_write(&shard_key, WriteStep::DeleteLookup, err));
            }
        }
        Ok(rowcount)
    }
}
