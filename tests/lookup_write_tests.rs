/// Coordinated lookup writes and table access tests
///
/// Checks the ordering of lookup and primary writes, keyspace-id column
/// maintenance, partial-write reporting and the transaction hook.
/// Run with: cargo test --test lookup_write_tests

mod common;

use shardroute::executor::RowDestination;
use shardroute::statement::{OrderBy, SelectOptions};
use shardroute::{
    DbError, InMemoryExecutor, KeyRange, KeyspaceId, OperationKind, RoutingParams, ShardedClient,
    Value, WriteStep, with_transaction,
};

fn pairs(items: &[(&str, Value)]) -> Vec<(String, Value)> {
    items
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn journal_steps(executor: &InMemoryExecutor) -> Vec<(String, OperationKind)> {
    executor
        .journal()
        .unwrap()
        .into_iter()
        .map(|entry| (entry.table, entry.kind))
        .collect()
}

/// Inserts a user by email only and returns the minted user id.
fn insert_user(client: &ShardedClient, executor: &mut InMemoryExecutor, email: &str) -> Value {
    client
        .accessor("users")
        .unwrap()
        .insert(
            executor,
            &RoutingParams::new(),
            &pairs(&[("email", email.into()), ("name", "Ann".into())]),
        )
        .unwrap()
        .generated_id
        .unwrap()
}

#[test]
fn test_insert_by_entity_creates_lookup_first() {
    let (client, mut executor) = common::setup();

    let user_id = insert_user(&client, &mut executor, "a@b.com");
    assert_eq!(user_id, Value::Integer(1));

    assert_eq!(
        journal_steps(&executor),
        vec![
            ("email_user_idx".to_string(), OperationKind::Insert),
            ("users".to_string(), OperationKind::Insert),
        ]
    );

    let lookup = executor.rows("email_user_idx").unwrap();
    assert_eq!(lookup.len(), 1);
    assert_eq!(lookup[0].get("email"), Some(&Value::from("a@b.com")));
    assert_eq!(lookup[0].get("user_id"), Some(&Value::Integer(1)));

    let users = executor.rows("users").unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].destination, RowDestination::Keyspace(KeyspaceId::new(1)));
    assert_eq!(users[0].get("user_id"), Some(&Value::Integer(1)));
    assert_eq!(users[0].get("keyspace_id"), Some(&Value::Integer(1)));
}

#[test]
fn test_insert_with_known_shard_key_mints_entity_id() {
    let (client, mut executor) = common::setup();
    let orders = client.accessor("orders").unwrap();

    let first = orders
        .insert(&mut executor, &RoutingParams::new().shard_key(42), &pairs(&[("total", 10.into())]))
        .unwrap();
    let second = orders
        .insert(&mut executor, &RoutingParams::new(), &pairs(&[("user_id", 42.into()), ("total", 20.into())]))
        .unwrap();

    assert_eq!(first.generated_id, Some(Value::Integer(1)));
    assert_eq!(second.generated_id, Some(Value::Integer(2)));

    let lookup = executor.rows("order_user_idx").unwrap();
    assert_eq!(lookup.len(), 2);
    assert!(lookup.iter().all(|row| row.get("user_id") == Some(&Value::Integer(42))));

    let rows = executor.rows("orders").unwrap();
    assert_eq!(rows[0].get("order_id"), Some(&Value::Integer(1)));
    assert_eq!(rows[0].get("user_id"), Some(&Value::Integer(42)));
    assert_eq!(rows[1].get("order_id"), Some(&Value::Integer(2)));
}

#[test]
fn test_insert_with_both_keys_mints_nothing() {
    let (client, mut executor) = common::setup();

    let outcome = client
        .accessor("users")
        .unwrap()
        .insert(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("user_id", 9.into()), ("email", "c@d.com".into())]),
        )
        .unwrap();

    assert_eq!(outcome.generated_id, None);
    let lookup = executor.rows("email_user_idx").unwrap();
    assert_eq!(lookup[0].get("user_id"), Some(&Value::Integer(9)));
}

#[test]
fn test_insert_rejects_conflicting_routing() {
    let (client, mut executor) = common::setup();
    let users = client.accessor("users").unwrap();

    let err = users
        .insert(&mut executor, &RoutingParams::new().shard_key(1), &pairs(&[("user_id", 2.into())]))
        .unwrap_err();
    assert!(matches!(err, DbError::ConfigurationError(_)));

    let err = users
        .insert(&mut executor, &RoutingParams::new(), &pairs(&[("name", "Ann".into())]))
        .unwrap_err();
    assert!(matches!(err, DbError::ConfigurationError(_)));

    let err = users
        .insert(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("user_id", 3.into()), ("email", "x@y.com".into()), ("keyspace_id", 99.into())]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::ValidationError(_)));

    assert!(executor.journal().unwrap().is_empty());
}

#[test]
fn test_select_by_entity_and_by_key() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");
    insert_user(&client, &mut executor, "z@b.com");
    let users = client.accessor("users").unwrap();

    let by_entity = users
        .select_by_columns(
            &mut executor,
            &RoutingParams::new().entity("email", "a@b.com"),
            &pairs(&[("email", "a@b.com".into())]),
            Some(&["user_id".to_string(), "name".to_string()]),
            &SelectOptions::default(),
        )
        .unwrap();
    assert_eq!(by_entity.columns, vec!["user_id", "name"]);
    assert_eq!(by_entity.rows, vec![vec![user_id.clone(), Value::from("Ann")]]);

    // The shard key in the predicates routes the read
    let by_key = users
        .select_by_columns(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("user_id", user_id)]),
            None,
            &SelectOptions::default(),
        )
        .unwrap();
    assert_eq!(by_key.row_count(), 1);
    assert_eq!(by_key.db_rows()[0].get("email"), Some(&Value::from("a@b.com")));

    let err = users
        .select_by_columns(
            &mut executor,
            &RoutingParams::new().shard_key(1),
            &[],
            Some(&["password".to_string()]),
            &SelectOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::ConfigurationError(_)));
}

#[test]
fn test_reads_only_see_routed_rows() {
    let (client, mut executor) = common::setup();
    let events = client.accessor("events").unwrap();
    for (user_id, seq) in [(5, 1), (5, 2), (5, 3), (6, 1)] {
        events
            .insert(
                &mut executor,
                &RoutingParams::new(),
                &pairs(&[("user_id", user_id.into()), ("kind", "login".into()), ("seq", seq.into())]),
            )
            .unwrap();
    }

    let latest = events
        .select_by_columns(
            &mut executor,
            &RoutingParams::new().shard_key(5),
            &[],
            Some(&["seq".to_string()]),
            &SelectOptions::new().order_by(OrderBy::desc("seq")).limit(2),
        )
        .unwrap();
    assert_eq!(latest.rows, vec![vec![Value::Integer(3)], vec![Value::Integer(2)]]);

    let everything = events
        .select_by_columns(
            &mut executor,
            &RoutingParams::new().key_range(KeyRange::full()),
            &[],
            None,
            &SelectOptions::default(),
        )
        .unwrap();
    assert_eq!(everything.row_count(), 4);
}

#[test]
fn test_custom_sharded_rows_stay_on_their_shard() {
    let (client, mut executor) = common::setup();
    let blobs = client.accessor("blobs").unwrap();

    blobs
        .insert(
            &mut executor,
            &RoutingParams::new().shard_name("80-"),
            &pairs(&[("blob_id", 1.into()), ("data", "x".into())]),
        )
        .unwrap();

    let count = |executor: &mut InMemoryExecutor, shard: &str| {
        blobs
            .select_by_columns(
                executor,
                &RoutingParams::new().shard_name(shard),
                &[],
                None,
                &SelectOptions::default(),
            )
            .unwrap()
            .row_count()
    };
    assert_eq!(count(&mut executor, "80-"), 1);
    assert_eq!(count(&mut executor, "-80"), 0);
}

#[test]
fn test_custom_sharded_write_rejects_any_name_set() {
    let (client, mut executor) = common::setup();
    let blobs = client.accessor("blobs").unwrap();
    let values = pairs(&[("blob_id", 1.into()), ("data", "x".into())]);

    for names in [vec!["80-", "80-"], vec!["80-"]] {
        let err = blobs
            .insert(&mut executor, &RoutingParams::new().shard_names(names), &values)
            .unwrap_err();
        assert!(matches!(err, DbError::WriteRoutingError(_)), "{:?}", err);
    }
    assert!(executor.journal().unwrap().is_empty());
}

#[test]
fn test_unset_entity_columns_through_update_and_delete() {
    let (client, mut executor) = common::setup();
    let accounts = client.accessor("accounts").unwrap();
    let account = |executor: &mut InMemoryExecutor, values: &[(&str, Value)]| {
        accounts
            .insert(executor, &RoutingParams::new(), &pairs(values))
            .unwrap()
            .generated_id
            .unwrap()
    };

    let first = account(&mut executor, &[("email", "a@b.com".into())]);
    assert_eq!(executor.rows("account_email_idx").unwrap().len(), 1);
    assert!(executor.rows("account_phone_idx").unwrap().is_empty());

    // Entity columns sharing a lookup table share one row.
    let second = account(
        &mut executor,
        &[("email", "c@d.com".into()), ("nickname", "cee".into()), ("phone", "555".into())],
    );
    let emails = executor.rows("account_email_idx").unwrap();
    assert_eq!(emails.len(), 2);
    assert_eq!(emails[1].get("nickname"), Some(&Value::from("cee")));
    assert_eq!(emails[1].get("account_id"), Some(&second));
    assert_eq!(executor.rows("account_phone_idx").unwrap().len(), 1);

    let updated = accounts
        .update_columns(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("account_id", first.clone())]),
            &pairs(&[("nickname", "ay".into()), ("phone", "777".into())]),
        )
        .unwrap();
    assert_eq!(updated, 1);
    let emails = executor.rows("account_email_idx").unwrap();
    assert_eq!(emails[0].get("email"), Some(&Value::from("a@b.com")));
    assert_eq!(emails[0].get("nickname"), Some(&Value::from("ay")));
    assert_eq!(emails[1].get("email"), Some(&Value::from("c@d.com")));
    let phones = executor.rows("account_phone_idx").unwrap();
    assert_eq!(phones.len(), 2);
    assert_eq!(phones[1].get("phone"), Some(&Value::from("777")));
    assert_eq!(phones[1].get("account_id"), Some(&first));

    let third = account(&mut executor, &[("email", "e@f.com".into())]);
    for account_id in [third, first, second] {
        let deleted = accounts
            .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("account_id", account_id)]), None)
            .unwrap();
        assert_eq!(deleted, 1);
    }
    assert!(executor.rows("accounts").unwrap().is_empty());
    assert!(executor.rows("account_email_idx").unwrap().is_empty());
    assert!(executor.rows("account_phone_idx").unwrap().is_empty());
}

#[test]
fn test_update_of_lookup_column_follows_primary() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");
    executor.clear_journal().unwrap();
    let users = client.accessor("users").unwrap();

    let updated = users
        .update_columns(
            &mut executor,
            &RoutingParams::new().shard_key(user_id.clone()),
            &pairs(&[("user_id", user_id.clone())]),
            &pairs(&[("email", "new@b.com".into())]),
        )
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(
        journal_steps(&executor),
        vec![
            ("users".to_string(), OperationKind::Update),
            ("email_user_idx".to_string(), OperationKind::Update),
        ]
    );

    let lookup = executor.rows("email_user_idx").unwrap();
    assert_eq!(lookup[0].get("email"), Some(&Value::from("new@b.com")));

    let err = client
        .resolve(
            &mut executor,
            "users",
            OperationKind::Select,
            &RoutingParams::new().entity("email", "a@b.com"),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::NotFoundError(_)));
}

#[test]
fn test_update_adds_keyspace_id_predicate() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");

    let descriptor = client
        .accessor("users")
        .unwrap()
        .plan_update(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("user_id", user_id)]),
            &pairs(&[("name", "Bea".into())]),
        )
        .unwrap();

    assert_eq!(
        descriptor.statement.sql,
        "UPDATE users SET name = :update_name WHERE user_id = :user_id AND keyspace_id = :keyspace_id"
    );
    assert_eq!(descriptor.statement.bind_var("keyspace_id"), Some(&Value::Integer(1)));
}

#[test]
fn test_update_matching_nothing() {
    let (client, mut executor) = common::setup();
    insert_user(&client, &mut executor, "a@b.com");
    let users = client.accessor("users").unwrap();

    // Plain columns: zero rows is not an error
    let updated = users
        .update_columns(
            &mut executor,
            &RoutingParams::new().shard_key(77),
            &pairs(&[("name", "nobody".into())]),
            &pairs(&[("name", "Bea".into())]),
        )
        .unwrap();
    assert_eq!(updated, 0);

    // Lookup columns: zero rows is NotFound and the lookup is left alone
    executor.clear_journal().unwrap();
    let err = users
        .update_columns(
            &mut executor,
            &RoutingParams::new().shard_key(77),
            &pairs(&[("user_id", 77.into())]),
            &pairs(&[("email", "x@b.com".into())]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::NotFoundError(_)));
    assert_eq!(journal_steps(&executor), vec![("users".to_string(), OperationKind::Update)]);
    assert_eq!(
        executor.rows("email_user_idx").unwrap()[0].get("email"),
        Some(&Value::from("a@b.com"))
    );
}

#[test]
fn test_update_rejects_routing_columns_and_empty_predicates() {
    let (client, mut executor) = common::setup();
    let users = client.accessor("users").unwrap();

    let err = users
        .update_columns(
            &mut executor,
            &RoutingParams::new().shard_key(1),
            &pairs(&[("user_id", 1.into())]),
            &pairs(&[("user_id", 2.into())]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::ValidationError(_)));

    let err = users
        .update_columns(
            &mut executor,
            &RoutingParams::new().shard_key(1),
            &[],
            &pairs(&[("name", "Bea".into())]),
        )
        .unwrap_err();
    assert!(matches!(err, DbError::PreconditionError(_)));
}

#[test]
fn test_delete_removes_lookup_after_primary() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");
    executor.clear_journal().unwrap();
    let users = client.accessor("users").unwrap();

    let deleted = users
        .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("user_id", user_id.clone())]), None)
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(
        journal_steps(&executor),
        vec![
            ("users".to_string(), OperationKind::Delete),
            ("email_user_idx".to_string(), OperationKind::Delete),
        ]
    );
    assert!(executor.rows("users").unwrap().is_empty());
    assert!(executor.rows("email_user_idx").unwrap().is_empty());

    let err = users
        .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("user_id", user_id)]), None)
        .unwrap_err();
    assert!(matches!(err, DbError::NotFoundError(_)));
}

#[test]
fn test_delete_without_predicates_is_precondition_error() {
    let (client, mut executor) = common::setup();

    for table in ["users", "events", "settings"] {
        let err = client
            .accessor(table)
            .unwrap()
            .delete_by_columns(&mut executor, &RoutingParams::new().shard_key(1), &[], None)
            .unwrap_err();
        assert!(matches!(err, DbError::PreconditionError(_)), "{}: {:?}", table, err);
    }
    assert!(executor.journal().unwrap().is_empty());
}

#[test]
fn test_second_lookup_table_failure_is_partial_write() {
    let (client, mut executor) = common::setup();
    executor.fail_next("account_phone_idx", OperationKind::Insert).unwrap();

    let err = client
        .accessor("accounts")
        .unwrap()
        .insert(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("email", "a@b.com".into()), ("phone", "555".into())]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::PartialWriteError {
            step: WriteStep::CreateLookup,
            ..
        }
    ));
    assert_eq!(executor.rows("account_email_idx").unwrap().len(), 1);
    assert!(executor.rows("accounts").unwrap().is_empty());
}

#[test]
fn test_primary_insert_failure_is_partial_write() {
    let (client, mut executor) = common::setup();
    executor.fail_next("users", OperationKind::Insert).unwrap();

    let err = client
        .accessor("users")
        .unwrap()
        .insert(&mut executor, &RoutingParams::new(), &pairs(&[("email", "a@b.com".into())]))
        .unwrap_err();

    match err {
        DbError::PartialWriteError {
            table,
            shard_key,
            step,
            source,
        } => {
            assert_eq!(table, "users");
            assert_eq!(shard_key, Value::Integer(1));
            assert_eq!(step, WriteStep::PrimaryInsert);
            assert!(matches!(*source, DbError::ExecutionError(_)));
        }
        other => panic!("expected a partial write, got {:?}", other),
    }

    // The lookup row is left behind for the caller to reconcile
    assert_eq!(executor.rows("email_user_idx").unwrap().len(), 1);
    assert!(executor.rows("users").unwrap().is_empty());
}

#[test]
fn test_lookup_failures_after_primary_are_partial_writes() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");
    let users = client.accessor("users").unwrap();

    executor.fail_next("email_user_idx", OperationKind::Update).unwrap();
    let err = users
        .update_columns(
            &mut executor,
            &RoutingParams::new(),
            &pairs(&[("user_id", user_id.clone())]),
            &pairs(&[("email", "new@b.com".into())]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::PartialWriteError {
            step: WriteStep::UpdateLookup,
            ..
        }
    ));

    executor.fail_next("email_user_idx", OperationKind::Delete).unwrap();
    let err = users
        .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("user_id", user_id)]), None)
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::PartialWriteError {
            step: WriteStep::DeleteLookup,
            ..
        }
    ));
    assert!(executor.rows("users").unwrap().is_empty());
    assert_eq!(executor.rows("email_user_idx").unwrap().len(), 1);
}

#[test]
fn test_missing_lookup_row_on_delete_is_reported() {
    let (client, mut executor) = common::setup();
    let user_id = insert_user(&client, &mut executor, "a@b.com");

    client
        .accessor("email_user_idx")
        .unwrap()
        .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("email", "a@b.com".into())]), None)
        .unwrap();

    let err = client
        .accessor("users")
        .unwrap()
        .delete_by_columns(&mut executor, &RoutingParams::new(), &pairs(&[("user_id", user_id)]), None)
        .unwrap_err();
    match err {
        DbError::PartialWriteError { step, source, .. } => {
            assert_eq!(step, WriteStep::DeleteLookup);
            assert!(matches!(*source, DbError::NotFoundError(_)));
        }
        other => panic!("expected a partial write, got {:?}", other),
    }
}

#[test]
fn test_transaction_hook_rolls_back_both_steps() {
    let (client, mut executor) = common::setup();
    let users = client.accessor("users").unwrap();
    executor.fail_next("users", OperationKind::Insert).unwrap();

    let err = with_transaction(&mut executor, |exec| {
        users.insert(exec, &RoutingParams::new(), &pairs(&[("email", "a@b.com".into())]))
    })
    .unwrap_err();
    assert!(err.is_partial_write());
    assert!(executor.rows("email_user_idx").unwrap().is_empty());

    let outcome = with_transaction(&mut executor, |exec| {
        users.insert(exec, &RoutingParams::new(), &pairs(&[("email", "a@b.com".into())]))
    })
    .unwrap();
    assert_eq!(outcome.generated_id, Some(Value::Integer(1)));
    assert_eq!(executor.rows("users").unwrap().len(), 1);
}
