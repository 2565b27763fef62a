//! The connection provider contract.

use async_trait::async_trait;

use crate::error::DbError;
use crate::schema::SchemaOp;

/// A transactional database handle used by the migrator and its steps.
///
/// The handle is owned by the caller and lent out as `&mut` for the duration
/// of a single call; neither the migrator nor a step keeps it or closes it.
///
/// Providers report failures as [`DbError`] and are responsible for
/// classifying benign schema errors ("already exists", "does not exist") via
/// [`DbError::is_benign`]. A benign failure of [`SchemaConnection::apply`] must
/// leave the surrounding transaction usable.
#[async_trait]
pub trait SchemaConnection: Send {
    /// Starts a transaction.
    async fn begin(&mut self) -> Result<(), DbError>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> Result<(), DbError>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Executes a raw SQL statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64, DbError>;

    /// Applies a typed DDL operation.
    async fn apply(&mut self, op: &SchemaOp) -> Result<(), DbError>;

    /// Whether a table with this name exists.
    async fn table_exists(&mut self, table: &str) -> Result<bool, DbError>;

    /// Whether `table` exists and has a column named `column`.
    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, DbError>;

    /// Number of rows in `table`.
    async fn count_rows(&mut self, table: &str) -> Result<u64, DbError>;

    /// Number of rows in `table` where `column` is not `NULL`.
    async fn count_values(&mut self, table: &str, column: &str) -> Result<u64, DbError>;
}
