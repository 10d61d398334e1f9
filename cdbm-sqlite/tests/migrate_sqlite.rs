//! End-to-end migration runs against a real SQLite database.

use std::path::Path;
use std::sync::Arc;

use cdbm_migrate::{
    CustomMigration, CustomMigrations, Database, Dialect, MigrationConfig, MigrationDirection,
    MigrationEngine, MigrationError, SchemaState, SqlFileStepRunner, SqlSchemaStateStore,
};
use cdbm_sqlite::SqliteDatabase;
use futures::FutureExt;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

type Engine = MigrationEngine<SqlSchemaStateStore, SqlFileStepRunner>;

fn write(dir: &Path, name: &str, sql: &str) {
    std::fs::write(dir.join(name), sql).unwrap();
}

/// Three file migrations creating `users`, `posts` and `tags`.
fn three_tables() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (version, table) in [(1, "users"), (2, "posts"), (3, "tags")] {
        write(
            dir.path(),
            &format!("{version:06}_create_{table}.up.sql"),
            &format!("CREATE TABLE {table} (id INTEGER PRIMARY KEY);"),
        );
        write(
            dir.path(),
            &format!("{version:06}_create_{table}.down.sql"),
            &format!("DROP TABLE {table};"),
        );
    }
    dir
}

async fn setup() -> (SqliteDatabase, Arc<dyn Database>) {
    let db = SqliteDatabase::memory().await.unwrap();
    let shared = db.clone().into_shared();
    (db, shared)
}

fn engine(dir: &TempDir, db: &Arc<dyn Database>, config: MigrationConfig) -> Engine {
    let config = config.migrations_dir(dir.path());
    MigrationEngine::for_database(config, db.clone(), Dialect::Sqlite).unwrap()
}

async fn tables(db: &SqliteDatabase) -> Vec<String> {
    let rows = db
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )
        .await
        .unwrap();
    rows.iter().map(|r| r.get_string(0).unwrap()).collect()
}

async fn state_rows(db: &SqliteDatabase, table: &str) -> i64 {
    db.query_row(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await
        .unwrap()
        .unwrap()
        .get_i64(0)
        .unwrap()
}

#[tokio::test]
async fn test_up_from_fresh_database() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    let report = engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.starting_version, 0);
    assert_eq!(report.final_version, 3);
    assert_eq!(report.applied.len(), 3);
    assert_eq!(
        tables(&db).await,
        vec!["posts", "schema_migrations", "tags", "users"]
    );
    assert_eq!(state_rows(&db, "schema_migrations").await, 1);

    let state = engine(&dir, &shared, MigrationConfig::new())
        .status()
        .await
        .unwrap();
    assert_eq!(
        state,
        SchemaState::Clean {
            version: 3,
            is_custom: false
        }
    );
}

#[tokio::test]
async fn test_second_run_is_no_change() {
    let dir = three_tables();
    let (_db, shared) = setup().await;

    engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap();
    let report = engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap();

    assert!(report.is_no_change());
    assert_eq!(report.summary(), "No Change");
}

#[tokio::test]
async fn test_down_to_zero_removes_state_row() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap();
    let report = engine(&dir, &shared, MigrationConfig::new().target_version(Some(0)))
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.direction, Some(MigrationDirection::Down));
    assert_eq!(report.final_version, 0);
    assert_eq!(tables(&db).await, vec!["schema_migrations"]);
    assert_eq!(state_rows(&db, "schema_migrations").await, 0);
}

#[tokio::test]
async fn test_target_above_latest_is_rejected() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    let err = engine(&dir, &shared, MigrationConfig::new().target_version(Some(9)))
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::TargetNotFound { target: 9, latest: 3 }));
    assert!(tables(&db).await.is_empty());
}

#[tokio::test]
async fn test_dirty_database_requires_reset() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    engine(&dir, &shared, MigrationConfig::new().target_version(Some(2)))
        .migrate()
        .await
        .unwrap();
    db.batch_execute("UPDATE schema_migrations SET dirty = 1, dirty_state = 'Up'")
        .await
        .unwrap();

    let err = engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DirtyState {
            version: 2,
            direction: Some(MigrationDirection::Up)
        }
    ));

    let report = engine(&dir, &shared, MigrationConfig::new().reset_dirty_flag(true))
        .migrate()
        .await
        .unwrap();

    assert_eq!(report.corrected_version, Some(2));
    assert_eq!(report.final_version, 3);
    assert_eq!(
        tables(&db).await,
        vec!["posts", "schema_migrations", "tags", "users"]
    );
}

#[tokio::test]
async fn test_failed_script_is_undone_by_its_transaction() {
    let dir = three_tables();
    write(
        dir.path(),
        "000002_create_posts.up.sql",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY);\nINSERT INTO missing VALUES (1);",
    );
    let (db, shared) = setup().await;

    let err = engine(&dir, &shared, MigrationConfig::new())
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::StepFailed { version: 2, .. }));
    assert_eq!(tables(&db).await, vec!["schema_migrations", "users"]);

    let state = engine(&dir, &shared, MigrationConfig::new())
        .status()
        .await
        .unwrap();
    assert_eq!(
        state,
        SchemaState::Dirty {
            version: 2,
            direction: Some(MigrationDirection::Up),
            is_custom: false
        }
    );
}

#[tokio::test]
async fn test_rollback_after_custom_failure() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "000001_users.up.sql", "CREATE TABLE users (id INTEGER);");
    write(dir.path(), "000001_users.down.sql", "DROP TABLE users;");
    let (db, shared) = setup().await;

    let custom = CustomMigrations::new().with(
        2,
        CustomMigration::new(
            |db| async move { db.batch_execute("INSERT INTO users VALUES (1)").await }.boxed(),
            |db| async move { db.batch_execute("DELETE FROM users").await }.boxed(),
        ),
    )
    .with(
        3,
        CustomMigration::new(
            |_db| async move { Err::<(), _>(MigrationError::custom("backfill failed")) }.boxed(),
            |_db| async move { Ok::<(), MigrationError>(()) }.boxed(),
        ),
    );

    let err = engine(&dir, &shared, MigrationConfig::new().rollback_on_failure(true))
        .with_custom_migrations(custom)
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::RolledBack { version: 0, .. }));
    assert!(err.to_string().contains("backfill failed"));
    assert_eq!(tables(&db).await, vec!["schema_migrations"]);
    assert_eq!(state_rows(&db, "schema_migrations").await, 0);
}

#[tokio::test]
async fn test_custom_migration_recorded_as_custom() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    let custom = CustomMigrations::new().with(
        4,
        CustomMigration::new(
            |db| async move { db.batch_execute("INSERT INTO users VALUES (1)").await }.boxed(),
            |db| async move { db.batch_execute("DELETE FROM users").await }.boxed(),
        ),
    );

    engine(&dir, &shared, MigrationConfig::new())
        .with_custom_migrations(custom)
        .migrate()
        .await
        .unwrap();

    let row = db
        .query_row(
            "SELECT version, dirty, is_custom_migration FROM schema_migrations",
            &[],
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.get_i64(0).unwrap(), 4);
    assert!(!row.get_bool(1).unwrap());
    assert!(row.get_bool(2).unwrap());
    assert_eq!(state_rows(&db, "users").await, 1);
}

#[tokio::test]
async fn test_version_collision_touches_nothing() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    let custom = CustomMigrations::new().with(
        2,
        CustomMigration::new(
            |_db| async move { Ok::<(), MigrationError>(()) }.boxed(),
            |_db| async move { Ok::<(), MigrationError>(()) }.boxed(),
        ),
    );

    let err = engine(&dir, &shared, MigrationConfig::new())
        .with_custom_migrations(custom)
        .migrate()
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::VersionCollision { version: 2, .. }));
    assert!(tables(&db).await.is_empty());
}

#[tokio::test]
async fn test_custom_table_name() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    engine(&dir, &shared, MigrationConfig::new().table_name("app_versions"))
        .migrate()
        .await
        .unwrap();

    let names = tables(&db).await;
    assert!(names.contains(&"app_versions".to_string()));
    assert!(!names.contains(&"schema_migrations".to_string()));
}

#[tokio::test]
async fn test_force_and_drop() {
    let dir = three_tables();
    let (db, shared) = setup().await;

    let engine = engine(&dir, &shared, MigrationConfig::new());
    let forced = engine.force(2).await.unwrap();
    assert_eq!(
        forced,
        SchemaState::Clean {
            version: 2,
            is_custom: false
        }
    );
    // Force runs no scripts.
    assert_eq!(tables(&db).await, vec!["schema_migrations"]);

    engine.drop_all().await.unwrap();
    assert!(tables(&db).await.is_empty());
}
