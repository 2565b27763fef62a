use stratum::prelude::*;
use stratum::workflow::{self, Baseline, EnsembleTables};
use stratum_mem::InMemoryConnection;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn migrator() -> Migrator {
    Migrator::new(workflow::registry().expect("workflow registry"))
}

fn v(version: i64) -> SchemaVersion {
    SchemaVersion::new(version)
}

fn column_names(table: &Table) -> Vec<String> {
    table.columns.iter().map(|c| c.name.clone()).collect()
}

/// A database migrated to version 1 with one recorded workflow.
async fn version_one() -> (InMemoryConnection, Migrator) {
    init_logger();
    let mut conn = InMemoryConnection::new();
    let mut migrator = migrator();
    migrator
        .migrate(&mut conn, Target::Version(v(1)), false)
        .await
        .expect("baseline should apply");
    conn.insert_row("workflow", [("wf_id", "1"), ("wf_uuid", "2d1c6a4e")])
        .expect("insert workflow");
    (conn, migrator)
}

fn master_workflow_table() -> Table {
    Table::new("master_workflow")
        .column(Column::new("wf_id", ColumnType::Serial).primary_key())
        .column(Column::new("wf_uuid", ColumnType::Varchar(255)).not_null())
}

fn master_workflow_state_table() -> Table {
    Table::new("master_workflowstate")
        .column(
            Column::new("wf_id", ColumnType::Integer)
                .not_null()
                .references_cascade("master_workflow", "wf_id"),
        )
        .column(Column::new("state", ColumnType::Varchar(255)).not_null())
}

fn stampede_workflow_table() -> Table {
    Table::new("workflow")
        .column(Column::new("wf_id", ColumnType::Serial).primary_key())
        .column(Column::new("wf_uuid", ColumnType::Varchar(255)).not_null())
        .column(Column::new("parent_wf_id", ColumnType::Integer))
}

#[test]
fn registry_covers_every_version() {
    let registry = workflow::registry().unwrap();
    assert_eq!(registry.versions().collect::<Vec<_>>(), vec![v(1), v(2)]);
    assert_eq!(registry.latest(), workflow::LATEST);
    assert_eq!(registry.step(v(1)).unwrap().name(), "baseline");
    assert_eq!(registry.step(v(2)).unwrap().name(), "ensemble_tables");
}

#[tokio::test]
async fn fresh_database_upgrades_to_latest() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    let mut migrator = migrator();

    let report = migrator.upgrade(&mut conn, false).await.unwrap();

    assert_eq!(report.from, SchemaVersion::BASE);
    assert_eq!(report.to, workflow::LATEST);
    assert_eq!(report.versions(), vec![v(1), v(2)]);
    assert_eq!(
        conn.tables(),
        vec![
            "master_workflow",
            "master_workflowstate",
            "pg_ensemble",
            "pg_ensemble_workflow"
        ]
    );
    assert_eq!(
        conn.columns("master_workflow").unwrap(),
        column_names(&Baseline::workflow_table())
    );
    assert_eq!(migrator.state(), &MigrationState::AtVersion(workflow::LATEST));
    assert!(!conn.in_transaction());
}

#[tokio::test]
async fn version_one_database_is_renamed_and_keeps_rows() {
    let (mut conn, mut migrator) = version_one().await;

    let report = migrator.upgrade(&mut conn, false).await.unwrap();

    assert_eq!(report.versions(), vec![v(2)]);
    assert!(!conn.has_table("workflow"));
    assert!(!conn.has_table("workflowstate"));
    let rows = conn.rows("master_workflow").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["wf_uuid"], "2d1c6a4e");
    assert!(conn.has_table("pg_ensemble"));
    assert!(conn.has_table("pg_ensemble_workflow"));
}

#[tokio::test]
async fn update_twice_is_a_no_op_the_second_time() {
    let (mut conn, _) = version_one().await;
    let step = EnsembleTables;

    step.update(&mut conn, false).await.unwrap();
    let after_first = conn.schema();
    step.update(&mut conn, false).await.unwrap();

    assert_eq!(conn.schema(), after_first);
    assert_eq!(conn.rows("master_workflow").unwrap().len(), 1);
}

#[tokio::test]
async fn baseline_is_idempotent_and_respects_renamed_tables() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    Baseline.update(&mut conn, false).await.unwrap();
    let schema = conn.schema();
    Baseline.update(&mut conn, false).await.unwrap();
    assert_eq!(conn.schema(), schema);

    let mut renamed = InMemoryConnection::new();
    renamed.create_table(&master_workflow_table()).unwrap();
    Baseline.update(&mut renamed, false).await.unwrap();
    assert!(!renamed.has_table("workflow"));
    assert_eq!(Baseline.shape(&mut renamed).await.unwrap(), SchemaShape::Current);
}

#[tokio::test]
async fn non_empty_master_workflow_conflicts_and_leaves_database_unchanged() {
    let (mut conn, mut migrator) = version_one().await;
    conn.create_table(&master_workflow_table()).unwrap();
    conn.insert_row("master_workflow", [("wf_id", "7"), ("wf_uuid", "f00d")])
        .unwrap();
    let before = conn.schema();

    let err = migrator.upgrade(&mut conn, false).await.unwrap_err();

    assert!(
        matches!(&err, MigrationError::ConflictingState { table, rows: 1 } if table == "master_workflow"),
        "unexpected error: {err}"
    );
    assert_eq!(conn.schema(), before);
    assert_eq!(conn.rows("workflow").unwrap().len(), 1);
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(1));
    assert!(matches!(
        migrator.state(),
        MigrationState::Failed { version, .. } if *version == v(2)
    ));
}

#[tokio::test]
async fn both_targets_are_checked_before_anything_is_dropped() {
    let (mut conn, mut migrator) = version_one().await;
    conn.create_table(&master_workflow_table()).unwrap();
    conn.create_table(&master_workflow_state_table()).unwrap();
    conn.insert_row("master_workflow", [("wf_id", "3"), ("wf_uuid", "beef")])
        .unwrap();

    let err = migrator.upgrade(&mut conn, true).await.unwrap_err();

    assert!(matches!(
        &err,
        MigrationError::ConflictingState { table, .. } if table == "master_workflow"
    ));
    assert!(conn.has_table("master_workflowstate"));
}

#[tokio::test]
async fn empty_targets_are_dropped_and_rename_completes() {
    let (mut conn, mut migrator) = version_one().await;
    conn.create_table(&master_workflow_table()).unwrap();
    conn.create_table(&master_workflow_state_table()).unwrap();

    migrator.upgrade(&mut conn, false).await.unwrap();

    assert!(!conn.has_table("workflow"));
    assert_eq!(
        conn.columns("master_workflow").unwrap(),
        column_names(&Baseline::workflow_table())
    );
    assert_eq!(
        conn.columns("master_workflowstate").unwrap(),
        column_names(&Baseline::workflow_state_table())
    );
    assert_eq!(conn.rows("master_workflow").unwrap().len(), 1);
}

#[tokio::test]
async fn database_already_at_version_two_is_left_alone() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    conn.create_table(&master_workflow_table()).unwrap();
    conn.insert_row("master_workflow", [("wf_id", "1"), ("wf_uuid", "cafe")])
        .unwrap();
    conn.create_table(&EnsembleTables::ensemble_table()).unwrap();
    conn.create_table(&EnsembleTables::ensemble_workflow_table())
        .unwrap();
    let before = conn.schema();

    assert_eq!(
        EnsembleTables.shape(&mut conn).await.unwrap(),
        SchemaShape::Current
    );
    EnsembleTables.update(&mut conn, false).await.unwrap();

    assert_eq!(conn.schema(), before);
    assert_eq!(conn.rows("master_workflow").unwrap().len(), 1);
}

#[tokio::test]
async fn downgrade_then_update_round_trips() {
    let (mut conn, mut migrator) = version_one().await;
    let at_one = conn.schema();

    migrator.upgrade(&mut conn, false).await.unwrap();
    let at_two = conn.schema();

    let report = migrator
        .migrate(&mut conn, Target::Version(v(1)), false)
        .await
        .unwrap();
    assert_eq!(report.versions(), vec![v(2)]);
    assert_eq!(report.steps[0].direction, Direction::Downgrade);
    assert_eq!(conn.schema(), at_one);
    assert_eq!(conn.rows("workflow").unwrap().len(), 1);
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(1));

    migrator.upgrade(&mut conn, false).await.unwrap();
    assert_eq!(conn.schema(), at_two);
}

#[tokio::test]
async fn downgrade_refuses_to_drop_populated_ensembles_unless_forced() {
    let (mut conn, mut migrator) = version_one().await;
    migrator.upgrade(&mut conn, false).await.unwrap();
    conn.insert_row(
        "pg_ensemble",
        [("id", "1"), ("name", "nightly"), ("username", "alice")],
    )
    .unwrap();
    let at_two = conn.schema();

    let err = migrator
        .migrate(&mut conn, Target::Version(v(1)), false)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        MigrationError::ConflictingState { table, rows: 1 } if table == "pg_ensemble"
    ));
    assert_eq!(conn.schema(), at_two);

    migrator
        .migrate(&mut conn, Target::Version(v(1)), true)
        .await
        .unwrap();
    assert!(!conn.has_table("pg_ensemble"));
    assert!(conn.has_table("workflow"));
}

#[tokio::test]
async fn stampede_database_gains_db_url() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    conn.create_table(&stampede_workflow_table()).unwrap();

    assert_eq!(
        EnsembleTables.shape(&mut conn).await.unwrap(),
        SchemaShape::Current
    );
    EnsembleTables.update(&mut conn, false).await.unwrap();

    let columns = conn.columns("workflow").unwrap();
    assert_eq!(columns.last().map(String::as_str), Some("db_url"));
    assert!(!conn.has_table("master_workflow"));

    // Second run finds the column in place.
    EnsembleTables.update(&mut conn, false).await.unwrap();
    assert_eq!(conn.columns("workflow").unwrap(), columns);

    EnsembleTables.downgrade(&mut conn, false).await.unwrap();
    assert_eq!(
        conn.columns("workflow").unwrap(),
        column_names(&stampede_workflow_table())
    );
    assert!(!conn.has_table("pg_ensemble"));
}

#[tokio::test]
async fn stampede_downgrade_keeps_populated_db_url_unless_forced() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    let workflow = stampede_workflow_table().column(Column::new("db_url", ColumnType::Text));
    conn.create_table(&workflow).unwrap();
    conn.insert_row(
        "workflow",
        [
            ("wf_id", "1"),
            ("wf_uuid", "2d1c6a4e"),
            ("db_url", "sqlite:///home/pegasus/run0001/workflow.db"),
        ],
    )
    .unwrap();

    EnsembleTables.update(&mut conn, false).await.unwrap();
    EnsembleTables.downgrade(&mut conn, false).await.unwrap();

    assert_eq!(conn.columns("workflow").unwrap(), column_names(&workflow));
    assert_eq!(
        conn.rows("workflow").unwrap()[0].get("db_url").map(String::as_str),
        Some("sqlite:///home/pegasus/run0001/workflow.db")
    );
    assert!(!conn.has_table("pg_ensemble"));

    EnsembleTables.update(&mut conn, false).await.unwrap();
    EnsembleTables.downgrade(&mut conn, true).await.unwrap();
    assert_eq!(
        conn.columns("workflow").unwrap(),
        column_names(&stampede_workflow_table())
    );
}

#[tokio::test]
async fn unknown_shape_fails_unless_forced() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    assert_eq!(
        EnsembleTables.shape(&mut conn).await.unwrap(),
        SchemaShape::Unknown
    );

    let err = EnsembleTables.update(&mut conn, false).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::UnexpectedSchemaState { version, .. } if version == v(2)
    ));

    let mut conn = InMemoryConnection::new();
    EnsembleTables.update(&mut conn, true).await.unwrap();
    assert!(conn.has_table("pg_ensemble"));
    assert!(!conn.has_table("master_workflow"));
}

#[tokio::test]
async fn downgrade_through_baseline_requires_force() {
    init_logger();
    let mut conn = InMemoryConnection::new();
    let mut migrator = migrator();
    migrator.upgrade(&mut conn, false).await.unwrap();
    let at_two = conn.schema();

    let err = migrator
        .migrate(&mut conn, Target::Version(SchemaVersion::BASE), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::DowngradeUnsupported { version, .. } if version == v(1)
    ));
    assert_eq!(conn.schema(), at_two);
    assert_eq!(migrator.current_version(&mut conn).await.unwrap(), v(2));

    let report = migrator
        .migrate(&mut conn, Target::Version(SchemaVersion::BASE), true)
        .await
        .unwrap();
    assert_eq!(report.versions(), vec![v(2), v(1)]);
    assert!(!report.steps[0].skipped);
    assert!(report.steps[1].skipped);
    assert_eq!(conn.tables(), vec!["workflow", "workflowstate"]);
    assert!(migrator.applied(&mut conn).await.unwrap().is_empty());
    assert_eq!(
        migrator.state(),
        &MigrationState::AtVersion(SchemaVersion::BASE)
    );
}

#[tokio::test]
async fn status_reports_ledger_and_shape() {
    let (mut conn, migrator) = version_one().await;

    let status = migrator.status(&mut conn).await.unwrap();

    assert_eq!(status.len(), 2);
    assert_eq!(status[0].name, "baseline");
    assert!(status[0].applied.is_some());
    assert_eq!(status[0].shape, SchemaShape::Current);
    assert_eq!(status[1].name, "ensemble_tables");
    assert!(status[1].applied.is_none());
    assert_eq!(status[1].shape, SchemaShape::Legacy);
}
