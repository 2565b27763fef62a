use async_trait::async_trait;
use stratum_core::SchemaVersion;
use stratum_core::connection::SchemaConnection;
use stratum_core::error::MigrationError;
use stratum_core::schema::{Column, ColumnType, SchemaOp, SchemaShape, Table};
use stratum_core::step::{DowngradeSupport, MigrationStep, Vacancy, apply_ddl, vacancy};

use super::v001_baseline::{WORKFLOW, WORKFLOW_STATE};

const VERSION: SchemaVersion = SchemaVersion::new(2);

const MASTER_WORKFLOW: &str = "master_workflow";
const MASTER_WORKFLOW_STATE: &str = "master_workflowstate";
const ENSEMBLE: &str = "pg_ensemble";
const ENSEMBLE_WORKFLOW: &str = "pg_ensemble_workflow";

/// Where the `workflow` tables of a database stand relative to version 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// A per-workflow (stampede) database: `workflow` carries `parent_wf_id`.
    Stampede,
    /// A version 1 master database: `workflow` carries `db_url`.
    LegacyMaster,
    /// A master database already renamed to `master_workflow`.
    Master,
    Unknown,
}

impl Layout {
    async fn detect(conn: &mut dyn SchemaConnection) -> Result<Self, MigrationError> {
        if conn.column_exists(WORKFLOW, "parent_wf_id").await? {
            Ok(Layout::Stampede)
        } else if conn.column_exists(WORKFLOW, "db_url").await? {
            Ok(Layout::LegacyMaster)
        } else if conn.table_exists(MASTER_WORKFLOW).await? {
            Ok(Layout::Master)
        } else {
            Ok(Layout::Unknown)
        }
    }

    fn shape(self) -> SchemaShape {
        match self {
            Layout::Stampede | Layout::Master => SchemaShape::Current,
            Layout::LegacyMaster => SchemaShape::Legacy,
            Layout::Unknown => SchemaShape::Unknown,
        }
    }
}

/// Version 2: ensemble tables, and the move of the dashboard's workflow
/// tables to `master_workflow` / `master_workflowstate`.
///
/// Per-workflow databases only gain a `db_url` column on `workflow`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsembleTables;

impl EnsembleTables {
    /// The `pg_ensemble` table.
    pub fn ensemble_table() -> Table {
        Table::new(ENSEMBLE)
            .column(Column::new("id", ColumnType::Serial).primary_key())
            .column(Column::new("name", ColumnType::Varchar(100)).not_null())
            .column(Column::new("created", ColumnType::Timestamp).not_null())
            .column(Column::new("updated", ColumnType::Timestamp).not_null())
            .column(Column::new("state", ColumnType::Varchar(16)).not_null())
            .column(Column::new("max_running", ColumnType::Integer).not_null())
            .column(Column::new("max_planning", ColumnType::Integer).not_null())
            .column(Column::new("username", ColumnType::Varchar(100)).not_null())
            .unique(["username", "name"])
    }

    /// The `pg_ensemble_workflow` table.
    pub fn ensemble_workflow_table() -> Table {
        Table::new(ENSEMBLE_WORKFLOW)
            .column(Column::new("id", ColumnType::Serial).primary_key())
            .column(Column::new("name", ColumnType::Varchar(100)).not_null())
            .column(Column::new("basedir", ColumnType::Varchar(512)).not_null())
            .column(Column::new("created", ColumnType::Timestamp).not_null())
            .column(Column::new("updated", ColumnType::Timestamp).not_null())
            .column(Column::new("state", ColumnType::Varchar(16)).not_null())
            .column(Column::new("priority", ColumnType::Integer).not_null())
            .column(Column::new("wf_uuid", ColumnType::Varchar(36)))
            .column(Column::new("submitdir", ColumnType::Varchar(512)))
            .column(
                Column::new("ensemble_id", ColumnType::Integer)
                    .not_null()
                    .references_cascade(ENSEMBLE, "id"),
            )
            .column(
                Column::new("plan_command", ColumnType::Varchar(1024))
                    .not_null()
                    .default_sql("'./plan.sh'"),
            )
            .unique(["ensemble_id", "name"])
    }
}

/// Drops each table that exists and is empty. Every table is checked before
/// the first drop.
async fn clear_targets(
    conn: &mut dyn SchemaConnection,
    tables: &[&str],
) -> Result<(), MigrationError> {
    let mut empty = Vec::new();
    for &table in tables {
        if vacancy(conn, table).await? == Vacancy::Empty {
            empty.push(table);
        }
    }
    for table in empty {
        log::info!("Dropping empty table {table}");
        apply_ddl(conn, &SchemaOp::drop_table(table)).await?;
    }
    Ok(())
}

/// Drops `workflow.db_url` from a per-workflow database.
///
/// The column may predate version 2, so it is kept while it holds values
/// unless `force` is set.
async fn drop_db_url(conn: &mut dyn SchemaConnection, force: bool) -> Result<(), MigrationError> {
    if !conn.column_exists(WORKFLOW, "db_url").await? {
        return Ok(());
    }
    match conn.count_values(WORKFLOW, "db_url").await? {
        0 => {}
        values if force => log::warn!("Dropping {WORKFLOW}.db_url with {values} values"),
        values => {
            log::warn!("Keeping {WORKFLOW}.db_url, it holds {values} values");
            return Ok(());
        }
    }
    apply_ddl(conn, &SchemaOp::drop_column(WORKFLOW, "db_url")).await?;
    Ok(())
}

async fn rename(conn: &mut dyn SchemaConnection, from: &str, to: &str) -> Result<(), MigrationError> {
    apply_ddl(conn, &SchemaOp::rename_table(from, to)).await?;
    Ok(())
}

#[async_trait]
impl MigrationStep for EnsembleTables {
    fn name(&self) -> &'static str {
        "ensemble_tables"
    }

    fn downgrade_support(&self) -> DowngradeSupport {
        DowngradeSupport::Supported
    }

    async fn shape(&self, conn: &mut dyn SchemaConnection) -> Result<SchemaShape, MigrationError> {
        Ok(Layout::detect(conn).await?.shape())
    }

    async fn update(
        &self,
        conn: &mut dyn SchemaConnection,
        force: bool,
    ) -> Result<(), MigrationError> {
        apply_ddl(conn, &SchemaOp::CreateTable(Self::ensemble_table())).await?;
        apply_ddl(conn, &SchemaOp::CreateTable(Self::ensemble_workflow_table())).await?;

        match Layout::detect(conn).await? {
            Layout::Stampede => {
                apply_ddl(
                    conn,
                    &SchemaOp::add_column(WORKFLOW, Column::new("db_url", ColumnType::Text)),
                )
                .await?;
                return Ok(());
            }
            Layout::LegacyMaster => {}
            Layout::Master => {
                log::debug!("{MASTER_WORKFLOW} already in place");
                return Ok(());
            }
            Layout::Unknown if force => {
                log::warn!("No workflow tables found, skipping the rename to {MASTER_WORKFLOW}");
                return Ok(());
            }
            Layout::Unknown => {
                return Err(MigrationError::unexpected_state(
                    VERSION,
                    format!("neither {WORKFLOW} nor {MASTER_WORKFLOW} exists"),
                ));
            }
        }

        clear_targets(conn, &[MASTER_WORKFLOW_STATE, MASTER_WORKFLOW]).await?;
        rename(conn, WORKFLOW, MASTER_WORKFLOW).await?;
        rename(conn, WORKFLOW_STATE, MASTER_WORKFLOW_STATE).await?;
        Ok(())
    }

    async fn downgrade(
        &self,
        conn: &mut dyn SchemaConnection,
        force: bool,
    ) -> Result<(), MigrationError> {
        match Layout::detect(conn).await? {
            Layout::Stampede => drop_db_url(conn, force).await?,
            Layout::Master => {
                clear_targets(conn, &[WORKFLOW_STATE, WORKFLOW]).await?;
                rename(conn, MASTER_WORKFLOW, WORKFLOW).await?;
                rename(conn, MASTER_WORKFLOW_STATE, WORKFLOW_STATE).await?;
            }
            Layout::LegacyMaster => log::debug!("{WORKFLOW} not renamed, nothing to restore"),
            Layout::Unknown if force => {
                log::warn!("No workflow tables found, dropping the ensemble tables only");
            }
            Layout::Unknown => {
                return Err(MigrationError::unexpected_state(
                    VERSION,
                    format!("neither {WORKFLOW} nor {MASTER_WORKFLOW} exists"),
                ));
            }
        }

        for table in [ENSEMBLE_WORKFLOW, ENSEMBLE] {
            match vacancy(conn, table).await {
                Ok(_) => {}
                Err(MigrationError::ConflictingState { rows, .. }) if force => {
                    log::warn!("Dropping {table} with {rows} rows");
                }
                Err(e) => return Err(e),
            }
            apply_ddl(conn, &SchemaOp::drop_table(table)).await?;
        }
        Ok(())
    }
}
