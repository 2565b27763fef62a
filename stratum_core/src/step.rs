//! The per-version migration contract.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::SchemaVersion;
use crate::connection::SchemaConnection;
use crate::error::MigrationError;
use crate::schema::{SchemaOp, SchemaShape};

/// Whether a step can be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowngradeSupport {
    /// [`MigrationStep::downgrade`] reverses [`MigrationStep::update`].
    Supported,
    /// The step is forward-only. The migrator refuses to downgrade through it
    /// unless forced, in which case it is skipped.
    Unsupported,
}

/// A single version transition.
///
/// Steps are registered under the version they upgrade *to* and are
/// instantiated fresh for every run. They hold no state and receive the
/// connection as a parameter on every call.
///
/// The migrator wraps each call in its own transaction: a step must not
/// commit or roll back.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use stratum_core::prelude::*;
///
/// pub struct AddNotesColumn;
///
/// #[async_trait]
/// impl MigrationStep for AddNotesColumn {
///     fn name(&self) -> &'static str { "add_notes_column" }
///
///     fn downgrade_support(&self) -> DowngradeSupport { DowngradeSupport::Supported }
///
///     async fn update(&self, conn: &mut dyn SchemaConnection, _force: bool) -> Result<(), MigrationError> {
///         apply_ddl(conn, &SchemaOp::add_column("workflow", Column::new("notes", ColumnType::Text))).await?;
///         Ok(())
///     }
///
///     async fn downgrade(&self, conn: &mut dyn SchemaConnection, _force: bool) -> Result<(), MigrationError> {
///         apply_ddl(conn, &SchemaOp::drop_column("workflow", "notes")).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Human-readable name (e.g. "ensemble_tables").
    fn name(&self) -> &'static str;

    /// Whether [`MigrationStep::downgrade`] is implemented.
    fn downgrade_support(&self) -> DowngradeSupport;

    /// Inspects the live schema for the shapes this step knows about.
    async fn shape(&self, _conn: &mut dyn SchemaConnection) -> Result<SchemaShape, MigrationError> {
        Ok(SchemaShape::Unknown)
    }

    /// Brings the schema from the previous version to this one.
    ///
    /// Must be idempotent: when the target shape is already present the call
    /// succeeds without changing anything. `force` relaxes precondition checks.
    async fn update(&self, conn: &mut dyn SchemaConnection, force: bool)
    -> Result<(), MigrationError>;

    /// Reverts the schema to the previous version.
    async fn downgrade(
        &self,
        conn: &mut dyn SchemaConnection,
        force: bool,
    ) -> Result<(), MigrationError>;

    /// Returns the checksum of this migration for tamper detection.
    ///
    /// Default implementation computes SHA-256 of version + name.
    fn checksum(&self, version: SchemaVersion) -> String {
        let mut hasher = Sha256::new();
        hasher.update(version.get().to_le_bytes());
        hasher.update(self.name().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Result of [`apply_ddl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOutcome {
    /// The operation changed the schema.
    Applied,
    /// The provider reported a benign error; the change was already in place
    /// (or its subject was already gone).
    AlreadySatisfied,
}

/// Applies one DDL operation, treating benign provider errors as no-ops.
///
/// An error is only benign when it is benign for this operation (see
/// [`SchemaOp::tolerates`]): a `CREATE TABLE` failing on a missing foreign key
/// target is not satisfied. Any other error is returned as
/// [`MigrationError::Database`]; the migrator rolls back the step's
/// transaction when it sees it.
pub async fn apply_ddl(
    conn: &mut dyn SchemaConnection,
    op: &SchemaOp,
) -> Result<DdlOutcome, MigrationError> {
    match conn.apply(op).await {
        Ok(()) => {
            log::debug!("{op}: applied");
            Ok(DdlOutcome::Applied)
        }
        Err(e) if e.is_benign() && op.tolerates(e.kind()) => {
            log::debug!("{op}: already satisfied ({e})");
            Ok(DdlOutcome::AlreadySatisfied)
        }
        Err(e) => Err(MigrationError::Database(e)),
    }
}

/// State of a table a step wants to create or rename into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vacancy {
    /// No table by that name.
    Missing,
    /// The table exists without rows and can be dropped.
    Empty,
}

/// Checks that `table` is absent or empty.
///
/// Fails with [`MigrationError::ConflictingState`] when it holds rows.
pub async fn vacancy(
    conn: &mut dyn SchemaConnection,
    table: &str,
) -> Result<Vacancy, MigrationError> {
    if !conn.table_exists(table).await? {
        return Ok(Vacancy::Missing);
    }
    match conn.count_rows(table).await? {
        0 => Ok(Vacancy::Empty),
        rows => Err(MigrationError::ConflictingState {
            table: table.to_string(),
            rows,
        }),
    }
}
