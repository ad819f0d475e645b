//! Parameterized statement assembly.
//!
//! Statements keep both the rendered SQL text with named bind variables and
//! the structured pieces it was built from, so executors can run either.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::{ColumnValues, DbError, Result, Value};
use crate::routing::OperationKind;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Prefix for bind variables of `SET` assignments.
pub const UPDATE_BIND_PREFIX: &str = "update_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: false }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self { column: column.into(), descending: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOptions {
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<String>,
    pub limit: Option<usize>,
}

impl SelectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: OperationKind,
    pub table: String,
    pub sql: String,
    pub bind_vars: Vec<(String, Value)>,
    /// Select list, or the inserted columns.
    pub columns: Vec<String>,
    /// `column = value` conjuncts of the WHERE clause.
    pub predicates: ColumnValues,
    /// `SET` pairs of an update, or the row of an insert.
    pub assignments: ColumnValues,
    pub options: SelectOptions,
}

impl Statement {
    pub fn bind_var(&self, name: &str) -> Option<&Value> {
        self.bind_vars
            .iter()
            .find(|(bind, _)| bind == name)
            .map(|(_, value)| value)
    }
}

pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DbError::ConfigurationError(format!(
            "'{}' is not a valid identifier",
            name
        )))
    }
}

/// Hands out unique bind-variable names.
#[derive(Default)]
struct BindNames {
    used: HashMap<String, usize>,
}

impl BindNames {
    fn next(&mut self, base: &str) -> String {
        let count = self.used.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{}_{}", base, *count - 1)
        }
    }
}

fn where_clause(
    predicates: &[(String, Value)],
    names: &mut BindNames,
    bind_vars: &mut Vec<(String, Value)>,
) -> Result<String> {
    let mut conjuncts = Vec::with_capacity(predicates.len());
    for (column, value) in predicates {
        validate_identifier(column)?;
        if value.is_null() {
            conjuncts.push(format!("{} IS NULL", column));
            continue;
        }
        let bind = names.next(column);
        conjuncts.push(format!("{} = :{}", column, bind));
        bind_vars.push((bind, value.clone()));
    }
    Ok(conjuncts.join(" AND "))
}

pub fn require_predicates(kind: OperationKind, table: &str, predicates: &[(String, Value)]) -> Result<()> {
    if predicates.is_empty() {
        return Err(DbError::PreconditionError(format!(
            "{} on whole table '{}' is not allowed",
            kind, table
        )));
    }
    Ok(())
}

pub fn select_by_columns_query(
    columns: &[String],
    table: &str,
    predicates: &[(String, Value)],
    options: &SelectOptions,
) -> Result<Statement> {
    validate_identifier(table)?;
    if columns.is_empty() {
        return Err(DbError::ConfigurationError(format!(
            "select on '{}' needs at least one column",
            table
        )));
    }
    for column in columns {
        validate_identifier(column)?;
    }

    let mut names = BindNames::default();
    let mut bind_vars = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), table);

    let clause = where_clause(predicates, &mut names, &mut bind_vars)?;
    if !clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    if !options.group_by.is_empty() {
        for column in &options.group_by {
            validate_identifier(column)?;
        }
        sql.push_str(" GROUP BY ");
        sql.push_str(&options.group_by.join(", "));
    }
    if !options.order_by.is_empty() {
        let mut terms = Vec::with_capacity(options.order_by.len());
        for order in &options.order_by {
            validate_identifier(&order.column)?;
            terms.push(if order.descending {
                format!("{} DESC", order.column)
            } else {
                order.column.clone()
            });
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&terms.join(", "));
    }
    if let Some(limit) = options.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(Statement {
        kind: OperationKind::Select,
        table: table.to_string(),
        sql,
        bind_vars,
        columns: columns.to_vec(),
        predicates: predicates.to_vec(),
        assignments: Vec::new(),
        options: options.clone(),
    })
}

pub fn insert_query(table: &str, values: &[(String, Value)]) -> Result<Statement> {
    validate_identifier(table)?;
    if values.is_empty() {
        return Err(DbError::ConfigurationError(format!(
            "insert into '{}' needs at least one value",
            table
        )));
    }

    let mut names = BindNames::default();
    let mut bind_vars = Vec::with_capacity(values.len());
    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());
    for (column, value) in values {
        validate_identifier(column)?;
        if columns.contains(column) {
            return Err(DbError::ConfigurationError(format!(
                "column '{}' is inserted twice",
                column
            )));
        }
        let bind = names.next(column);
        placeholders.push(format!(":{}", bind));
        bind_vars.push((bind, value.clone()));
        columns.push(column.clone());
    }

    Ok(Statement {
        kind: OperationKind::Insert,
        table: table.to_string(),
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        ),
        bind_vars,
        columns,
        predicates: Vec::new(),
        assignments: values.to_vec(),
        options: SelectOptions::default(),
    })
}

pub fn update_columns_query(
    table: &str,
    predicates: &[(String, Value)],
    updates: &[(String, Value)],
) -> Result<Statement> {
    validate_identifier(table)?;
    require_predicates(OperationKind::Update, table, predicates)?;
    if updates.is_empty() {
        return Err(DbError::ConfigurationError(format!(
            "update of '{}' needs at least one column to set",
            table
        )));
    }

    let mut names = BindNames::default();
    let mut bind_vars = Vec::new();
    let mut sets = Vec::with_capacity(updates.len());
    for (column, value) in updates {
        validate_identifier(column)?;
        let bind = names.next(&format!("{}{}", UPDATE_BIND_PREFIX, column));
        sets.push(format!("{} = :{}", column, bind));
        bind_vars.push((bind, value.clone()));
    }
    let clause = where_clause(predicates, &mut names, &mut bind_vars)?;

    Ok(Statement {
        kind: OperationKind::Update,
        table: table.to_string(),
        sql: format!("UPDATE {} SET {} WHERE {}", table, sets.join(", "), clause),
        bind_vars,
        columns: Vec::new(),
        predicates: predicates.to_vec(),
        assignments: updates.to_vec(),
        options: SelectOptions::default(),
    })
}

pub fn delete_by_columns_query(
    table: &str,
    predicates: &[(String, Value)],
    limit: Option<usize>,
) -> Result<Statement> {
    validate_identifier(table)?;
    require_predicates(OperationKind::Delete, table, predicates)?;

    let mut names = BindNames::default();
    let mut bind_vars = Vec::new();
    let clause = where_clause(predicates, &mut names, &mut bind_vars)?;
    let mut sql = format!("DELETE FROM {} WHERE {}", table, clause);
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    Ok(Statement {
        kind: OperationKind::Delete,
        table: table.to_string(),
        sql,
        bind_vars,
        columns: Vec::new(),
        predicates: predicates.to_vec(),
        assignments: Vec::new(),
        options: SelectOptions {
            limit,
            ..SelectOptions::default()
        },
    })
}
