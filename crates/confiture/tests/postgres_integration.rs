//! Integration tests using testcontainers with Postgres 18.
//!
//! Each test gets its own container; nothing here touches a shared
//! cluster, so tests can run concurrently.

use std::path::Path;
use std::time::Duration;

use testcontainers::{ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;

use confiture::hooks::HookRegistry;
use confiture::lock::AdvisoryLock;
use confiture::migrate::{self, MigrationEngine, MigrationStatus};
use confiture::seed::engine as seed_engine;
use confiture::tracking::TrackingStore;
use confiture::{ddl, diff, introspect, normalize};

async fn start() -> (testcontainers::ContainerAsync<Postgres>, tokio_postgres::Client) {
    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start postgres container");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let connection_string =
        format!("host={host} port={port} user=postgres password=postgres dbname=postgres");

    let (client, connection) = tokio_postgres::connect(&connection_string, NoTls)
        .await
        .expect("failed to connect to postgres");

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {e}");
        }
    });

    (container, client)
}

fn write_unit(dir: &Path, version: &str, name: &str, up: &str, down: &str) {
    std::fs::write(dir.join(format!("{version}_{name}.up.sql")), up).unwrap();
    std::fs::write(dir.join(format!("{version}_{name}.down.sql")), down).unwrap();
}

#[tokio::test]
async fn fresh_apply_then_rollback_round_trips_the_tracking_table() {
    let (_container, mut client) = start().await;
    let dir = tempfile::tempdir().unwrap();
    write_unit(
        dir.path(),
        "001",
        "users",
        "CREATE TABLE users (id int primary key, email text not null);",
        "DROP TABLE users;",
    );

    let units = migrate::discover(dir.path()).unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let engine = MigrationEngine::new(units, tracking, HookRegistry::new());

    {
        let tx = client.transaction().await.unwrap();
        let applied = engine.up(&tx, None).await.unwrap();
        assert_eq!(applied, vec!["001".to_string()]);
        tx.commit().await.unwrap();
    }

    {
        let tx = client.transaction().await.unwrap();
        let status = engine.status(&tx).await.unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, MigrationStatus::Applied);
        tx.rollback().await.unwrap();
    }

    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'users')",
            &[],
        )
        .await
        .unwrap();
    assert!(row.get::<_, bool>(0), "users table should exist after up()");

    {
        let tx = client.transaction().await.unwrap();
        let rolled_back = engine.down(&tx, 1).await.unwrap();
        assert_eq!(rolled_back, vec!["001".to_string()]);
        tx.commit().await.unwrap();
    }

    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'users')",
            &[],
        )
        .await
        .unwrap();
    assert!(!row.get::<_, bool>(0), "users table should be gone after down()");

    let tx = client.transaction().await.unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    assert!(tracking.applied_versions(&tx).await.unwrap().is_empty());
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn target_version_truncates_the_pending_set() {
    let (_container, mut client) = start().await;
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001", "a", "CREATE TABLE a (id int);", "DROP TABLE a;");
    write_unit(dir.path(), "002", "b", "CREATE TABLE b (id int);", "DROP TABLE b;");
    write_unit(dir.path(), "003", "c", "CREATE TABLE c (id int);", "DROP TABLE c;");

    let units = migrate::discover(dir.path()).unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let engine = MigrationEngine::new(units, tracking, HookRegistry::new());

    let tx = client.transaction().await.unwrap();
    let applied = engine.up(&tx, Some("002")).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(applied, vec!["001".to_string(), "002".to_string()]);

    let tx = client.transaction().await.unwrap();
    let status = engine.status(&tx).await.unwrap();
    tx.rollback().await.unwrap();

    let pending: Vec<_> = status
        .iter()
        .filter(|e| e.status == MigrationStatus::Pending)
        .map(|e| e.version.as_str())
        .collect();
    assert_eq!(pending, vec!["003"]);
}

#[tokio::test]
async fn lock_contention_times_out_the_second_waiter() {
    let (container, client_a) = start().await;
    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let connection_string =
        format!("host={host} port={port} user=postgres password=postgres dbname=postgres");
    let (client_b, connection_b) = tokio_postgres::connect(&connection_string, NoTls)
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = connection_b.await;
    });

    let tracking_table = "confiture_migrations";

    // Two distinct sessions: advisory locks are session-scoped, so the
    // same session re-acquiring its own lock would be a silent no-op —
    // real contention requires a second connection.
    let mut holder = AdvisoryLock::acquire(&client_a, tracking_table, Duration::from_secs(1))
        .await
        .unwrap();

    let result = AdvisoryLock::acquire(&client_b, tracking_table, Duration::from_millis(300)).await;
    assert!(result.is_err(), "second session should time out while the first holds the lock");

    holder.release().await.unwrap();

    let second = AdvisoryLock::acquire(&client_b, tracking_table, Duration::from_secs(1)).await;
    assert!(second.is_ok(), "lock should be acquirable once released");
}

#[tokio::test]
async fn seed_engine_loads_values_and_copy_paths_and_row_count_matches() {
    let (_container, mut client) = start().await;
    client
        .batch_execute("CREATE TABLE users (id int primary key, name text not null);")
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut seed_sql = String::from("INSERT INTO users (id, name) VALUES\n");
    let rows: Vec<String> = (1..=50)
        .map(|i| format!("({i}, 'user_{i}')"))
        .collect();
    seed_sql.push_str(&rows.join(",\n"));
    seed_sql.push_str(";\n");
    std::fs::write(dir.path().join("users.sql"), &seed_sql).unwrap();

    let files = seed_engine::discover(dir.path()).unwrap();
    assert_eq!(files.len(), 1);

    let tx = client.transaction().await.unwrap();
    let options = seed_engine::SeedApplyOptions {
        copy_threshold: 10,
        continue_on_error: false,
    };
    let result = seed_engine::apply_all(&tx, &files, &options).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 0);
    assert!(result.file_results[0].used_copy, "50 rows over a threshold of 10 should route through COPY");

    let row = client.query_one("SELECT count(*) FROM users", &[]).await.unwrap();
    let count: i64 = row.get(0);
    assert_eq!(count, 50);
}

#[tokio::test]
async fn seed_apply_rolls_back_its_own_savepoint_on_failure_and_continues() {
    let (_container, mut client) = start().await;
    client
        .batch_execute("CREATE TABLE users (id int primary key, name text not null);")
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("a_broken.sql"),
        "INSERT INTO users (id, name) VALUES (1, 'a'), (1, 'duplicate-pk');",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b_good.sql"),
        "INSERT INTO users (id, name) VALUES (2, 'b');",
    )
    .unwrap();

    let files = seed_engine::discover(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let tx = client.transaction().await.unwrap();
    let options = seed_engine::SeedApplyOptions {
        copy_threshold: 100,
        continue_on_error: true,
    };
    let result = seed_engine::apply_all(&tx, &files, &options).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 1);

    let row = client.query_one("SELECT count(*) FROM users", &[]).await.unwrap();
    let count: i64 = row.get(0);
    assert_eq!(count, 1, "only the good file's row should have landed");
}

#[tokio::test]
async fn introspect_matches_declared_ddl_after_build_and_normalize_round_trip() {
    let (_container, client) = start().await;
    let declared = r#"
        CREATE TABLE users (
            id bigint PRIMARY KEY,
            email text NOT NULL,
            bio text
        );
    "#;
    client.batch_execute(declared).await.unwrap();

    let declared_facts = ddl::parse(declared).facts;
    let live_facts = introspect::introspect(&client, "public", None, false).await.unwrap();

    let declared_sql = introspect::to_create_table_sql(&declared_facts);
    let live_sql = introspect::to_create_table_sql(&live_facts);

    assert_eq!(normalize::normalize(&declared_sql), normalize::normalize(&live_sql));

    let changes = diff::diff(&declared_facts, &live_facts);
    assert!(changes.is_empty(), "declared and live facts should diff to nothing: {:?}", changes.changes);
}

#[tokio::test]
async fn diff_detects_added_and_dropped_columns() {
    let (_container, client) = start().await;
    client
        .batch_execute(
            "CREATE TABLE products (id bigint primary key, name text not null, legacy_flag boolean);",
        )
        .await
        .unwrap();

    let declared = "CREATE TABLE products (id bigint primary key, name text not null, price integer);";
    let declared_facts = ddl::parse(declared).facts;
    let live_facts = introspect::introspect(&client, "public", None, false).await.unwrap();

    let result = diff::diff(&live_facts, &declared_facts);
    assert!(!result.is_empty());

    let has_add_price = result
        .changes
        .iter()
        .any(|c| matches!(c, confiture::SchemaChange::AddColumn { column, .. } if column == "price"));
    let has_drop_legacy = result.changes.iter().any(|c| {
        matches!(c, confiture::SchemaChange::DropColumn { column, .. } if column == "legacy_flag")
    });
    assert!(has_add_price, "expected an AddColumn for price, got {:?}", result.changes);
    assert!(has_drop_legacy, "expected a DropColumn for legacy_flag, got {:?}", result.changes);
}

#[tokio::test]
async fn rebuild_protocol_marks_units_applied_without_replaying_incremental_ddl() {
    let (_container, mut client) = start().await;
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001", "users", "CREATE TABLE users (id int);", "DROP TABLE users;");
    write_unit(dir.path(), "002", "posts", "CREATE TABLE posts (id int);", "DROP TABLE posts;");

    let units = migrate::discover(dir.path()).unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let engine = MigrationEngine::new(units, tracking, HookRegistry::new());

    // Drift: create the tables by hand, outside the migration engine, so
    // there is something for the rebuild to replace.
    client
        .batch_execute("CREATE TABLE users (id int); CREATE TABLE posts (id int);")
        .await
        .unwrap();

    let declared_ddl = "CREATE TABLE users (id int primary key); CREATE TABLE posts (id int primary key);";

    let tx = client.transaction().await.unwrap();
    let result = engine
        .rebuild(&tx, &["public".to_string()], declared_ddl, true, false)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(result.schemas_dropped, vec!["public".to_string()]);
    assert_eq!(result.units_marked_applied, 2);

    let tx = client.transaction().await.unwrap();
    let applied = engine.status(&tx).await.unwrap();
    tx.rollback().await.unwrap();
    assert!(applied.iter().all(|e| e.status == MigrationStatus::Applied));

    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns WHERE table_name = 'users' AND column_name = 'id' AND is_nullable = 'NO')",
            &[],
        )
        .await
        .unwrap();
    assert!(row.get::<_, bool>(0), "rebuild should have executed the declared DDL's NOT NULL primary key, not the drifted one");
}

#[tokio::test]
async fn rebuild_requires_explicit_confirmation() {
    let (_container, mut client) = start().await;
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let engine = MigrationEngine::new(Vec::new(), tracking, HookRegistry::new());

    let tx = client.transaction().await.unwrap();
    let result = engine
        .rebuild(&tx, &["public".to_string()], "", false, false)
        .await;
    assert!(result.is_err(), "rebuild without confirmed=true must be rejected");
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn status_reports_every_unit_pending_when_tracking_table_is_absent() {
    let (_container, mut client) = start().await;
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001", "a", "CREATE TABLE a (id int);", "DROP TABLE a;");

    let units = migrate::discover(dir.path()).unwrap();
    let tracking = TrackingStore::new("confiture_migrations_never_created").unwrap();
    let engine = MigrationEngine::new(units, tracking, HookRegistry::new());

    let tx = client.transaction().await.unwrap();
    let status = engine.status(&tx).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(status.len(), 1);
    assert_eq!(status[0].status, MigrationStatus::Pending);
}

#[tokio::test]
async fn reinit_marks_units_applied_without_executing_their_sql() {
    let (_container, mut client) = start().await;
    let dir = tempfile::tempdir().unwrap();
    write_unit(dir.path(), "001", "a", "CREATE TABLE a (id int);", "DROP TABLE a;");
    write_unit(dir.path(), "002", "b", "CREATE TABLE b (id int);", "DROP TABLE b;");

    let units = migrate::discover(dir.path()).unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let engine = MigrationEngine::new(units, tracking, HookRegistry::new());

    let tx = client.transaction().await.unwrap();
    let marked = engine.reinit(&tx, Some("001")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(marked, 1);

    // reinit never runs the unit's DDL.
    let row = client
        .query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = 'a')",
            &[],
        )
        .await
        .unwrap();
    assert!(!row.get::<_, bool>(0), "reinit must not execute migration SQL");

    let tx = client.transaction().await.unwrap();
    let tracking = TrackingStore::new("confiture_migrations").unwrap();
    let applied = tracking.applied_versions(&tx).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(applied, vec!["001".to_string()]);
}
