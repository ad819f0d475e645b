//! Shared fixtures for the integration tests
//!
//! A small "user" keyspace with lookup-maintained tables (one of them
//! with two entity columns sharing a lookup table), a plain
//! range-sharded table, an unsharded table and a custom-sharded table.

#![allow(dead_code)]

use shardroute::schema::ShardKeyTransform;
use shardroute::{InMemoryExecutor, RegistryConfig, ShardedClient, ShardingScheme, TableConfig};

pub fn registry_config() -> RegistryConfig {
    RegistryConfig::new()
        .table(
            TableConfig::new("lookup", "email_user_idx", ShardingScheme::Unsharded)
                .columns(&["email", "user_id"]),
        )
        .table(
            TableConfig::new("lookup", "order_user_idx", ShardingScheme::Unsharded)
                .columns(&["order_id", "user_id"]),
        )
        .table(
            TableConfig::new("lookup", "account_email_idx", ShardingScheme::Unsharded)
                .columns(&["email", "nickname", "account_id"]),
        )
        .table(
            TableConfig::new("lookup", "account_phone_idx", ShardingScheme::Unsharded)
                .columns(&["phone", "account_id"]),
        )
        .table(
            TableConfig::new("user", "users", ShardingScheme::RangeShardedWithLookup)
                .columns(&["user_id", "email", "name", "keyspace_id"])
                .shard_key_column("user_id")
                .keyspace_id_column("keyspace_id")
                .lookup("email", "email_user_idx"),
        )
        .table(
            TableConfig::new("user", "orders", ShardingScheme::RangeShardedWithLookup)
                .columns(&["order_id", "user_id", "total"])
                .shard_key_column("user_id")
                .lookup("order_id", "order_user_idx"),
        )
        .table(
            TableConfig::new("user", "accounts", ShardingScheme::RangeShardedWithLookup)
                .columns(&["account_id", "email", "nickname", "phone"])
                .shard_key_column("account_id")
                .lookup("email", "account_email_idx")
                .lookup("nickname", "account_email_idx")
                .lookup("phone", "account_phone_idx"),
        )
        .table(
            TableConfig::new("user", "events", ShardingScheme::RangeSharded)
                .columns(&["user_id", "kind", "seq"])
                .shard_key_column("user_id"),
        )
        .table(
            TableConfig::new("user", "sessions", ShardingScheme::RangeSharded)
                .columns(&["token", "user_id"])
                .shard_key_column("token")
                .transform(ShardKeyTransform::Fnv1a),
        )
        .table(
            TableConfig::new("main", "settings", ShardingScheme::Unsharded)
                .columns(&["name", "value"]),
        )
        .table(
            TableConfig::new("blob", "blobs", ShardingScheme::CustomSharded)
                .columns(&["blob_id", "data"]),
        )
}

/// Client over [`registry_config`] plus an executor with every table created.
pub fn setup() -> (ShardedClient, InMemoryExecutor) {
    let client = ShardedClient::from_config(&registry_config()).unwrap();
    let executor = InMemoryExecutor::new();
    executor.create_table("email_user_idx", Some("user_id")).unwrap();
    executor.create_table("order_user_idx", Some("order_id")).unwrap();
    executor.create_table("account_email_idx", Some("account_id")).unwrap();
    executor.create_table("account_phone_idx", None).unwrap();
    for table in ["users", "orders", "accounts", "events", "sessions", "settings", "blobs"] {
        executor.create_table(table, None).unwrap();
    }
    (client, executor)
}
