use async_trait::async_trait;
use stratum_core::SchemaVersion;
use stratum_core::connection::SchemaConnection;
use stratum_core::error::MigrationError;
use stratum_core::schema::{Column, ColumnType, SchemaOp, SchemaShape, Table};
use stratum_core::step::{DowngradeSupport, MigrationStep, apply_ddl};

pub(crate) const WORKFLOW: &str = "workflow";
pub(crate) const WORKFLOW_STATE: &str = "workflowstate";

/// Version 1: the legacy dashboard tables `workflow` and `workflowstate`.
///
/// Forward-only. Reverting it would throw away the recorded workflow history.
#[derive(Debug, Clone, Copy, Default)]
pub struct Baseline;

impl Baseline {
    /// The `workflow` table as created by this version.
    pub fn workflow_table() -> Table {
        Table::new(WORKFLOW)
            .column(Column::new("wf_id", ColumnType::Serial).primary_key())
            .column(Column::new("wf_uuid", ColumnType::Varchar(255)).not_null())
            .column(Column::new("dax_label", ColumnType::Varchar(255)))
            .column(Column::new("timestamp", ColumnType::Timestamp))
            .column(Column::new("submit_hostname", ColumnType::Varchar(255)))
            .column(Column::new("submit_dir", ColumnType::Text))
            .column(Column::new("planner_arguments", ColumnType::Text))
            .column(Column::new("user", ColumnType::Varchar(255)))
            .column(Column::new("grid_dn", ColumnType::Varchar(255)))
            .column(Column::new("planner_version", ColumnType::Varchar(255)))
            .column(Column::new("dax_version", ColumnType::Varchar(255)))
            .column(Column::new("dax_file", ColumnType::Varchar(255)))
            .column(Column::new("db_url", ColumnType::Text))
    }

    /// The `workflowstate` table as created by this version.
    pub fn workflow_state_table() -> Table {
        Table::new(WORKFLOW_STATE)
            .column(
                Column::new("wf_id", ColumnType::Integer)
                    .not_null()
                    .references_cascade(WORKFLOW, "wf_id"),
            )
            .column(Column::new("state", ColumnType::Varchar(255)).not_null())
            .column(Column::new("timestamp", ColumnType::Timestamp).not_null())
            .column(
                Column::new("restart_count", ColumnType::Integer)
                    .not_null()
                    .default_sql("0"),
            )
            .column(Column::new("status", ColumnType::Integer))
    }
}

#[async_trait]
impl MigrationStep for Baseline {
    fn name(&self) -> &'static str {
        "baseline"
    }

    fn downgrade_support(&self) -> DowngradeSupport {
        DowngradeSupport::Unsupported
    }

    async fn shape(&self, conn: &mut dyn SchemaConnection) -> Result<SchemaShape, MigrationError> {
        if conn.table_exists(WORKFLOW).await? || conn.table_exists("master_workflow").await? {
            Ok(SchemaShape::Current)
        } else {
            Ok(SchemaShape::Unknown)
        }
    }

    async fn update(
        &self,
        conn: &mut dyn SchemaConnection,
        _force: bool,
    ) -> Result<(), MigrationError> {
        // A database past version 2 keeps its history under master_*.
        if conn.table_exists("master_workflow").await? {
            log::debug!("master_workflow present, legacy tables not created");
            return Ok(());
        }
        apply_ddl(conn, &SchemaOp::CreateTable(Self::workflow_table())).await?;
        apply_ddl(conn, &SchemaOp::CreateTable(Self::workflow_state_table())).await?;
        Ok(())
    }

    async fn downgrade(
        &self,
        _conn: &mut dyn SchemaConnection,
        _force: bool,
    ) -> Result<(), MigrationError> {
        Err(MigrationError::DowngradeUnsupported {
            version: SchemaVersion::new(1),
            name: self.name().to_string(),
        })
    }
}
