use serial_test::serial;
use stratum::prelude::*;
use stratum::workflow::{self, EnsembleTables};
use stratum_pg::{PgConfig, PgSchemaConnection};

const LEDGER: &str = "_stratum_workflow_test_migrations";

const TABLES: [&str; 6] = [
    "pg_ensemble_workflow",
    "pg_ensemble",
    "master_workflowstate",
    "master_workflow",
    "workflowstate",
    "workflow",
];

fn v(version: i64) -> SchemaVersion {
    SchemaVersion::new(version)
}

async fn connect() -> PgSchemaConnection {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = PgConfig::from_env().with_ledger_table(LEDGER);
    let mut conn = PgSchemaConnection::connect(&config)
        .await
        .expect("Failed to connect to postgres");
    teardown(&mut conn).await;
    conn
}

async fn teardown(conn: &mut PgSchemaConnection) {
    for table in TABLES.into_iter().chain([LEDGER]) {
        conn.execute(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .await
            .expect("Failed to drop table");
    }
}

fn migrator() -> Migrator {
    Migrator::new(workflow::registry().expect("workflow registry"))
}

/// A database at version 1 with one recorded workflow.
async fn version_one() -> (PgSchemaConnection, Migrator) {
    let mut conn = connect().await;
    let mut migrator = migrator();
    migrator
        .migrate(&mut conn, Target::Version(v(1)), false)
        .await
        .expect("baseline should apply");
    conn.execute("INSERT INTO workflow (wf_uuid) VALUES ('2d1c6a4e')")
        .await
        .expect("insert workflow");
    (conn, migrator)
}

async fn existing(conn: &mut PgSchemaConnection) -> Vec<&'static str> {
    let mut found = Vec::new();
    for table in TABLES {
        if conn.table_exists(table).await.unwrap() {
            found.push(table);
        }
    }
    found.sort_unstable();
    found
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres at STRATUM_DATABASE_URL or DATABASE_URL"]
async fn fresh_database_upgrades_to_latest() {
    let mut conn = connect().await;
    let mut migrator = migrator();

    let report = migrator.upgrade(&mut conn, false).await.unwrap();

    assert_eq!(report.versions(), vec![v(1), v(2)]);
    assert_eq!(
        existing(&mut conn).await,
        vec![
            "master_workflow",
            "master_workflowstate",
            "pg_ensemble",
            "pg_ensemble_workflow"
        ]
    );
    assert!(conn.column_exists("master_workflow", "db_url").await.unwrap());
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(2));

    teardown(&mut conn).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres at STRATUM_DATABASE_URL or DATABASE_URL"]
async fn non_empty_master_workflow_leaves_workflow_untouched() {
    let (mut conn, mut migrator) = version_one().await;
    conn.execute("CREATE TABLE master_workflow (wf_id SERIAL PRIMARY KEY, wf_uuid VARCHAR(255) NOT NULL)")
        .await
        .unwrap();
    conn.execute("INSERT INTO master_workflow (wf_uuid) VALUES ('f00d')")
        .await
        .unwrap();

    let err = migrator.upgrade(&mut conn, false).await.unwrap_err();

    assert!(
        matches!(&err, MigrationError::ConflictingState { table, rows: 1 } if table == "master_workflow"),
        "unexpected error: {err}"
    );
    assert_eq!(conn.count_rows("workflow").await.unwrap(), 1);
    assert_eq!(conn.count_rows("master_workflow").await.unwrap(), 1);
    assert!(conn.table_exists("workflowstate").await.unwrap());
    assert!(!conn.table_exists("pg_ensemble").await.unwrap());
    assert!(!conn.table_exists("pg_ensemble_workflow").await.unwrap());
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(1));

    teardown(&mut conn).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres at STRATUM_DATABASE_URL or DATABASE_URL"]
async fn empty_targets_are_dropped_and_rename_completes() {
    let (mut conn, mut migrator) = version_one().await;
    conn.execute("CREATE TABLE master_workflow (wf_id SERIAL PRIMARY KEY)")
        .await
        .unwrap();
    conn.execute(
        "CREATE TABLE master_workflowstate (wf_id INTEGER NOT NULL REFERENCES master_workflow (wf_id))",
    )
    .await
    .unwrap();

    migrator.upgrade(&mut conn, false).await.unwrap();

    assert!(!conn.table_exists("workflow").await.unwrap());
    assert_eq!(conn.count_rows("master_workflow").await.unwrap(), 1);
    assert!(conn.column_exists("master_workflow", "wf_uuid").await.unwrap());
    assert!(conn.column_exists("master_workflowstate", "restart_count").await.unwrap());

    teardown(&mut conn).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres at STRATUM_DATABASE_URL or DATABASE_URL"]
async fn downgrade_then_update_round_trips() {
    let (mut conn, mut migrator) = version_one().await;

    migrator.upgrade(&mut conn, false).await.unwrap();
    migrator
        .migrate(&mut conn, Target::Version(v(1)), false)
        .await
        .unwrap();

    assert_eq!(existing(&mut conn).await, vec!["workflow", "workflowstate"]);
    assert_eq!(conn.count_rows("workflow").await.unwrap(), 1);
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(1));

    migrator.upgrade(&mut conn, false).await.unwrap();
    assert_eq!(conn.count_rows("master_workflow").await.unwrap(), 1);

    teardown(&mut conn).await;
}

#[tokio::test]
#[serial]
#[ignore = "requires postgres at STRATUM_DATABASE_URL or DATABASE_URL"]
async fn stampede_downgrade_keeps_populated_db_url() {
    let mut conn = connect().await;
    conn.execute(
        "CREATE TABLE workflow (wf_id SERIAL PRIMARY KEY, wf_uuid VARCHAR(255) NOT NULL, \
         parent_wf_id INTEGER, db_url TEXT)",
    )
    .await
    .unwrap();
    conn.execute(
        "INSERT INTO workflow (wf_uuid, db_url) \
         VALUES ('2d1c6a4e', 'sqlite:///home/pegasus/run0001/workflow.db')",
    )
    .await
    .unwrap();

    EnsembleTables.update(&mut conn, false).await.unwrap();
    EnsembleTables.downgrade(&mut conn, false).await.unwrap();

    assert!(conn.column_exists("workflow", "db_url").await.unwrap());
    assert_eq!(conn.count_values("workflow", "db_url").await.unwrap(), 1);
    assert!(!conn.table_exists("pg_ensemble").await.unwrap());

    conn.execute("UPDATE workflow SET db_url = NULL").await.unwrap();
    EnsembleTables.update(&mut conn, false).await.unwrap();
    EnsembleTables.downgrade(&mut conn, false).await.unwrap();
    assert!(!conn.column_exists("workflow", "db_url").await.unwrap());

    teardown(&mut conn).await;
}
