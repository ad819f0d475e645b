use tracing::{Level, event, info_span};

use super::decision::{EntityLookup, OperationKind, RoutingDecision, ShardingScheme};
use super::key_range::KeyRange;
use crate::core::{DbError, Result, Value};
use crate::executor::Executor;
use crate::lookup::LookupCoordinator;
use crate::schema::TableDescriptor;

// Call-site parameters live next to the resolver that interprets them.
include!("resolver/params.rs");

/// Turns call-site routing parameters into a [`RoutingDecision`] for one
/// table.
pub struct ShardResolver<'a> {
    table: &'a TableDescriptor,
}

impl<'a> ShardResolver<'a> {
    pub fn new(table: &'a TableDescriptor) -> Self {
        Self { table }
    }

    /// Resolves where `op` must be sent.
    ///
    /// - unsharded: always the full key range, parameters are ignored;
    /// - range sharded: key range first, then explicit shard keys, then an
    ///   entity reference resolved through its lookup table;
    /// - custom sharded: the caller's shard names.
    ///
    /// Writes must resolve to exactly one destination.
    pub fn resolve(
        &self,
        executor: &mut dyn Executor,
        op: OperationKind,
        params: &RoutingParams,
    ) -> Result<RoutingDecision> {
        let span = info_span!(
            "routing.resolve",
            table = %self.table.table_name(),
            scheme = %self.table.scheme(),
            op = %op
        );
        let _enter = span.enter();

        let decision = match self.table.scheme() {
            ShardingScheme::Unsharded => RoutingDecision::ByKeyRange(KeyRange::full()),
            ShardingScheme::RangeSharded | ShardingScheme::RangeShardedWithLookup => {
                self.resolve_range_sharded(executor, op, params)?
            }
            ShardingScheme::CustomSharded => self.resolve_custom(op, params)?,
        };

        if let Err(err) = self.check_destinations(op, &decision) {
            event!(Level::DEBUG, error = %err, "routing rejected");
            return Err(err);
        }
        event!(Level::DEBUG, decision = %decision, "routing resolved");
        Ok(decision)
    }

    fn resolve_range_sharded(
        &self,
        executor: &mut dyn Executor,
        op: OperationKind,
        params: &RoutingParams,
    ) -> Result<RoutingDecision> {
        let table = self.table.table_name();
        if params.shard_name.is_some() || !params.shard_names.is_empty() {
            return Err(DbError::ConfigurationError(format!(
                "shard_name routing is only valid for custom-sharded tables, '{}' is {}",
                table,
                self.table.scheme()
            )));
        }

        let has_keys = !params.shard_keys.is_empty();
        if has_keys && params.entity.is_some() {
            return Err(DbError::ConfigurationError(format!(
                "ambiguous routing for '{}': both sharding_key and entity_id supplied",
                table
            )));
        }

        if let Some(range) = params.key_range {
            if op.is_write() && (has_keys || params.entity.is_some()) {
                return Err(DbError::ConfigurationError(format!(
                    "ambiguous write routing for '{}': key range combined with a sharding key or entity_id",
                    table
                )));
            }
            return Ok(RoutingDecision::ByKeyRange(range));
        }

        if has_keys {
            for key in &params.shard_keys {
                self.table.validate_shard_key(key)?;
            }
            return Ok(RoutingDecision::ByShardKeys(params.shard_keys.clone()));
        }

        if let Some(entity) = &params.entity {
            let resolved = LookupCoordinator::new(self.table).resolve_shard_keys(
                executor,
                &entity.column,
                &entity.value,
            )?;
            for key in &resolved {
                self.table.validate_shard_key(key)?;
            }
            return Ok(RoutingDecision::ByEntityLookup(EntityLookup {
                column: entity.column.clone(),
                resolved: resolved
                    .into_iter()
                    .map(|key| (entity.value.clone(), key))
                    .collect(),
            }));
        }

        Err(DbError::ConfigurationError(format!(
            "For sharded table '{}', sharding_key and entity_id cannot both be empty.",
            table
        )))
    }

    fn resolve_custom(&self, op: OperationKind, params: &RoutingParams) -> Result<RoutingDecision> {
        let table = self.table.table_name();
        if !params.shard_keys.is_empty() || params.key_range.is_some() || params.entity.is_some() {
            return Err(DbError::ConfigurationError(format!(
                "custom-sharded table '{}' routes by shard_name only",
                table
            )));
        }

        let requested: Vec<&String> = match (&params.shard_name, params.shard_names.is_empty()) {
            (Some(_), false) => {
                return Err(DbError::ConfigurationError(format!(
                    "ambiguous routing for '{}': both a single shard_name and a set supplied",
                    table
                )));
            }
            (Some(name), true) => vec![name],
            (None, false) => {
                if op.is_write() {
                    return Err(DbError::WriteRoutingError(format!(
                        "Writes require a unique destination: {} on '{}' got a set of shard names",
                        op, table
                    )));
                }
                params.shard_names.iter().collect()
            }
            (None, true) => {
                return Err(DbError::ConfigurationError(format!(
                    "For custom sharding, shard_name cannot be None (table '{}').",
                    table
                )));
            }
        };

        let mut names: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            if name.trim().is_empty() {
                return Err(DbError::ConfigurationError(format!(
                    "empty shard_name for table '{}'",
                    table
                )));
            }
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(RoutingDecision::ByShardName(names))
    }

    fn check_destinations(&self, op: OperationKind, decision: &RoutingDecision) -> Result<()> {
        let table = self.table.table_name();
        let count = decision.destination_count(self.table.scheme());
        if count == Some(0) {
            return Err(DbError::ConfigurationError(format!(
                "routing for '{}' names no destination",
                table
            )));
        }
        if !op.is_write() {
            return Ok(());
        }
        match count {
            Some(1) => Ok(()),
            Some(n) => Err(DbError::WriteRoutingError(format!(
                "Writes require a unique destination: {} on '{}' resolves to {} ({})",
                op, table, n, decision
            ))),
            None => Err(DbError::WriteRoutingError(format!(
                "Writes are not allowed on a key range: {} on '{}' resolves to {}",
                op, table, decision
            ))),
        }
    }
}

/// The single shard key of a write decision.
///
/// Only meaningful after [`ShardResolver::resolve`] accepted the decision
/// for a write on a range-sharded table.
pub fn single_shard_key(decision: &RoutingDecision) -> Result<Value> {
    match decision.effective_shard_keys() {
        Some(keys) if keys.len() == 1 => Ok(keys[0].clone()),
        _ => Err(DbError::WriteRoutingError(format!(
            "Writes require unique sharding_key, got {}",
            decision
        ))),
    }
}
