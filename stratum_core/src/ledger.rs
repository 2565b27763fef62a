//! Bookkeeping of applied migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::SchemaVersion;
use crate::error::DbError;

/// Record of a migration that has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// The version number of the migration.
    pub version: SchemaVersion,
    /// The human-readable name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
    /// The checksum recorded when the migration was applied.
    pub checksum: String,
}

/// Storage for the applied-versions ledger.
///
/// Writes go through the same handle as the schema changes, so a provider
/// that also implements [`SchemaConnection`](crate::connection::SchemaConnection)
/// records a migration inside the transaction that applied it.
#[async_trait]
pub trait MigrationLedger: Send {
    /// Creates the ledger if it does not exist yet.
    async fn ensure_ledger(&mut self) -> Result<(), DbError>;

    /// All recorded migrations, ordered by version.
    async fn applied(&mut self) -> Result<Vec<AppliedMigration>, DbError>;

    /// Records a migration as applied.
    async fn record_applied(
        &mut self,
        version: SchemaVersion,
        name: &str,
        checksum: &str,
    ) -> Result<(), DbError>;

    /// Removes the record for a version, if any.
    async fn remove_applied(&mut self, version: SchemaVersion) -> Result<(), DbError>;
}
