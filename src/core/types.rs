use super::Value;

pub type Row = Vec<Value>;

/// Ordered `(column, value)` pairs, used for predicates, assignments and
/// insert values. Order is preserved so generated statements are stable.
pub type ColumnValues = Vec<(String, Value)>;

/// Returns the value bound to `column`, if any.
pub fn column_value<'a>(pairs: &'a [(String, Value)], column: &str) -> Option<&'a Value> {
    pairs
        .iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| value)
}

/// Builds [`ColumnValues`] from anything that yields `(name, value)` pairs.
pub fn column_values<I, K, V>(pairs: I) -> ColumnValues
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(name, value)| (name.into(), value.into()))
        .collect()
}

/// Replaces the value of `column`, appending the pair when absent.
pub fn set_column_value(pairs: &mut ColumnValues, column: &str, value: Value) {
    match pairs.iter_mut().find(|(name, _)| name == column) {
        Some((_, slot)) => *slot = value,
        None => pairs.push((column.to_string(), value)),
    }
}
