use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection, PgPool};
use stratum_core::SchemaVersion;
use stratum_core::connection::SchemaConnection;
use stratum_core::error::DbError;
use stratum_core::ledger::{AppliedMigration, MigrationLedger};
use stratum_core::schema::SchemaOp;

use crate::config::PgConfig;
use crate::ddl::{quote_ident, render};
use crate::error::classify;

const SAVEPOINT: &str = "stratum_ddl";

#[derive(sqlx::FromRow)]
struct LedgerRow {
    version: i64,
    name: String,
    applied_at: DateTime<Utc>,
    checksum: String,
}

impl From<LedgerRow> for AppliedMigration {
    fn from(row: LedgerRow) -> Self {
        Self {
            version: SchemaVersion::new(row.version),
            name: row.name,
            applied_at: row.applied_at,
            checksum: row.checksum,
        }
    }
}

/// Connection provider backed by a single postgres connection.
///
/// Transactions are driven with plain `BEGIN`/`COMMIT`/`ROLLBACK`. Inside a
/// transaction every [`SchemaConnection::apply`] runs under a savepoint, so a
/// benign "already exists"/"does not exist" failure does not abort the
/// surrounding transaction.
pub struct PgSchemaConnection {
    conn: PgConnection,
    ledger_table: String,
    in_transaction: bool,
}

impl PgSchemaConnection {
    /// Opens a new connection using the given configuration.
    pub async fn connect(config: &PgConfig) -> Result<Self, DbError> {
        log::debug!("Connecting to postgres for schema migrations");
        let conn = PgConnection::connect(&config.database_url)
            .await
            .map_err(classify)?;
        Self::configured(conn, config).await
    }

    /// Takes a connection out of the pool and applies the ledger table and
    /// schema of `config`; its database URL is ignored. The connection is
    /// detached and does not return to the pool afterwards.
    pub async fn from_pool(pool: &PgPool, config: &PgConfig) -> Result<Self, DbError> {
        let conn = pool.acquire().await.map_err(classify)?.detach();
        Self::configured(conn, config).await
    }

    async fn configured(conn: PgConnection, config: &PgConfig) -> Result<Self, DbError> {
        let mut this = Self::from_connection(conn, config.ledger_table.clone());
        if let Some(schema) = &config.schema {
            this.execute(&format!("SET search_path TO {}", quote_ident(schema)))
                .await?;
        }
        Ok(this)
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: PgConnection, ledger_table: impl Into<String>) -> Self {
        Self {
            conn,
            ledger_table: ledger_table.into(),
            in_transaction: false,
        }
    }

    /// Returns the underlying connection.
    pub fn into_inner(self) -> PgConnection {
        self.conn
    }

    /// The name of the ledger table.
    pub fn ledger_table(&self) -> &str {
        &self.ledger_table
    }

    async fn run(&mut self, sql: &str) -> Result<u64, DbError> {
        let result = sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SchemaConnection for PgSchemaConnection {
    async fn begin(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::other("a transaction is already in progress"));
        }
        self.run("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let result = self.run("COMMIT").await;
        self.in_transaction = false;
        result.map(|_| ())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        let result = self.run("ROLLBACK").await;
        self.in_transaction = false;
        result.map(|_| ())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        log::debug!("execute: {sql}");
        self.run(sql).await
    }

    async fn apply(&mut self, op: &SchemaOp) -> Result<(), DbError> {
        let sql = render(op);
        log::debug!("apply: {sql}");
        if !self.in_transaction {
            return self.run(&sql).await.map(|_| ());
        }

        self.run(&format!("SAVEPOINT {SAVEPOINT}")).await?;
        match self.run(&sql).await {
            Ok(_) => {
                self.run(&format!("RELEASE SAVEPOINT {SAVEPOINT}")).await?;
                Ok(())
            }
            Err(e) => {
                self.run(&format!("ROLLBACK TO SAVEPOINT {SAVEPOINT}"))
                    .await?;
                Err(e)
            }
        }
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(&mut self.conn)
        .await
        .map_err(classify)
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, DbError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_one(&mut self.conn)
        .await
        .map_err(classify)
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64, DbError> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
                .fetch_one(&mut self.conn)
                .await
                .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn count_values(&mut self, table: &str, column: &str) -> Result<u64, DbError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT({}) FROM {}",
            quote_ident(column),
            quote_ident(table)
        ))
        .fetch_one(&mut self.conn)
        .await
        .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl MigrationLedger for PgSchemaConnection {
    async fn ensure_ledger(&mut self) -> Result<(), DbError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                checksum VARCHAR(64) NOT NULL
            )
            "#,
            quote_ident(&self.ledger_table)
        );
        self.run(&sql).await.map(|_| ())
    }

    async fn applied(&mut self) -> Result<Vec<AppliedMigration>, DbError> {
        let sql = format!(
            r#"
            SELECT version, name, applied_at, checksum
            FROM {}
            ORDER BY version ASC
            "#,
            quote_ident(&self.ledger_table)
        );
        let rows: Vec<LedgerRow> = sqlx::query_as(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(rows.into_iter().map(AppliedMigration::from).collect())
    }

    async fn record_applied(
        &mut self,
        version: SchemaVersion,
        name: &str,
        checksum: &str,
    ) -> Result<(), DbError> {
        let sql = format!(
            r#"
            INSERT INTO {} (version, name, checksum)
            VALUES ($1, $2, $3)
            "#,
            quote_ident(&self.ledger_table)
        );
        sqlx::query(&sql)
            .bind(version.get())
            .bind(name)
            .bind(checksum)
            .execute(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn remove_applied(&mut self, version: SchemaVersion) -> Result<(), DbError> {
        let sql = format!(
            "DELETE FROM {} WHERE version = $1",
            quote_ident(&self.ledger_table)
        );
        sqlx::query(&sql)
            .bind(version.get())
            .execute(&mut self.conn)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
