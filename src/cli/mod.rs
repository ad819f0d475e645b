//! Command handlers for the `shardroute` binary.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use shardroute::routing::unpack_keyspace_id;
use shardroute::{
    DispatchTarget, InMemoryExecutor, KeyRange, KeyspaceId, OperationKind, RegistryConfig,
    RoutingParams, ShardedClient, Value,
};

fn load_client(config: &Path) -> Result<ShardedClient> {
    let config = RegistryConfig::from_path(config)
        .with_context(|| format!("failed to load table config {}", config.display()))?;
    Ok(ShardedClient::from_config(&config)?)
}

/// Integers are taken as integer keys, anything else as text.
fn parse_shard_key(raw: &str) -> Value {
    match raw.parse::<i64>() {
        Ok(value) => Value::Integer(value),
        Err(_) => Value::Text(raw.to_string()),
    }
}

pub fn list_tables(config: &Path) -> Result<()> {
    let client = load_client(config)?;
    for table in client.registry().tables() {
        let lookups: Vec<String> = table
            .lookups()
            .iter()
            .map(|binding| format!("{}->{}", binding.column, binding.table.table_name()))
            .collect();
        println!(
            "{}.{}  {}  shard_key={}  lookups=[{}]",
            table.keyspace(),
            table.table_name(),
            table.scheme(),
            table.shard_key_column().unwrap_or("-"),
            lookups.join(", ")
        );
    }
    Ok(())
}

pub fn resolve(
    config: &Path,
    table: &str,
    op: OperationKind,
    shard_keys: &[String],
    key_range: Option<&str>,
    shard_names: &[String],
) -> Result<()> {
    let client = load_client(config)?;
    let mut params = RoutingParams::new().shard_keys(shard_keys.iter().map(|raw| parse_shard_key(raw)));
    // A single --shard-name is a single destination; repeating it asks for a set.
    params = match shard_names {
        [name] => params.shard_name(name.clone()),
        names => params.shard_names(names.iter().cloned()),
    };
    if let Some(range) = key_range {
        params = params.key_range(KeyRange::parse(range)?);
    }

    // Entity routing needs lookup rows, which only a live executor has.
    let mut executor = InMemoryExecutor::new();
    let decision = client.resolve(&mut executor, table, op, &params)?;
    let descriptor = client.registry().get(table)?;
    let target = DispatchTarget::from_decision(&descriptor, &decision)?;

    println!("decision: {}", decision);
    match target {
        DispatchTarget::KeyspaceIds(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            println!("keyspace ids: {}", ids.join(", "));
        }
        DispatchTarget::KeyRanges(ranges) => {
            let ranges: Vec<String> = ranges.iter().map(ToString::to_string).collect();
            println!("key ranges: {}", ranges.join(", "));
        }
        DispatchTarget::ShardNames(names) => println!("shards: {}", names.join(", ")),
    }
    Ok(())
}

pub fn keyspace_id(config: &Path, table: &str, shard_key: &str) -> Result<()> {
    let client = load_client(config)?;
    let descriptor = client.registry().get(table)?;
    let kid = descriptor.keyspace_id_for(&parse_shard_key(shard_key))?;
    println!("{} ({})", kid, kid.value());
    Ok(())
}

pub fn decode_token(token: &str) -> Result<()> {
    if token.len() % 2 != 0 || !token.is_ascii() {
        return Err(anyhow!("token must be an even number of hex digits"));
    }
    let bytes = (0..token.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&token[i..i + 2], 16))
        .collect::<std::result::Result<Vec<u8>, _>>()
        .with_context(|| format!("invalid hex token '{}'", token))?;
    let kid = KeyspaceId::new(unpack_keyspace_id(&bytes)?);
    println!("{} ({})", kid, kid.value());
    Ok(())
}
