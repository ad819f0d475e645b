/// A secondary-entity value to be resolved through a lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub column: String,
    pub value: Value,
}

/// Call-site routing parameters.
///
/// Which fields are honored depends on the table's sharding scheme; see
/// [`ShardResolver::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingParams {
    pub shard_keys: Vec<Value>,
    pub key_range: Option<KeyRange>,
    pub entity: Option<EntityRef>,
    /// A single named shard.
    pub shard_name: Option<String>,
    /// A set of named shards. Only reads accept a set, even one that
    /// collapses to a single name.
    pub shard_names: Vec<String>,
}

impl RoutingParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shard_key(mut self, key: impl Into<Value>) -> Self {
        self.shard_keys.push(key.into());
        self
    }

    pub fn shard_keys<I, V>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.shard_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn key_range(mut self, range: KeyRange) -> Self {
        self.key_range = Some(range);
        self
    }

    pub fn entity(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entity = Some(EntityRef {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn shard_name(mut self, name: impl Into<String>) -> Self {
        self.shard_name = Some(name.into());
        self
    }

    pub fn shard_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shard_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.shard_keys.is_empty()
            && self.key_range.is_none()
            && self.entity.is_none()
            && self.shard_name.is_none()
            && self.shard_names.is_empty()
    }
}
