use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use stratum_core::SchemaVersion;
use stratum_core::connection::SchemaConnection;
use stratum_core::error::DbError;
use stratum_core::ledger::{AppliedMigration, MigrationLedger};
use stratum_core::schema::{Column, SchemaOp, Table};

/// A row: column name to textual value. Missing columns read as `NULL`.
pub type Row = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct MemTable {
    columns: Vec<String>,
    /// Tables referenced through foreign keys.
    references: Vec<String>,
    rows: Vec<Row>,
}

/// Everything a transaction can change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Catalog {
    tables: BTreeMap<String, MemTable>,
    ledger: Option<BTreeMap<SchemaVersion, AppliedMigration>>,
}

/// An in-memory connection provider.
///
/// This connection is useful for testing and development purposes. It models
/// tables, columns, row counts, foreign key dependencies and the migration
/// ledger, and reports the same benign errors a relational database would.
///
/// # Transactions
///
/// `begin` takes a snapshot of the whole catalog, `rollback` restores it and
/// `commit` discards it. Only one transaction can be open at a time.
///
/// Raw SQL is not interpreted: [`SchemaConnection::execute`] always fails.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnection {
    catalog: Catalog,
    snapshot: Option<Catalog>,
}

impl InMemoryConnection {
    /// Creates an empty database.
    pub fn new() -> Self {
        log::debug!("Creating a new InMemoryConnection");
        Self::default()
    }

    /// Creates a table directly, outside of any migration. Used to seed a
    /// database in a given shape.
    pub fn create_table(&mut self, table: &Table) -> Result<(), DbError> {
        self.create(table)
    }

    /// Inserts a row. Every column must exist on the table.
    pub fn insert_row<K, V>(
        &mut self,
        table: &str,
        values: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), DbError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let entry = self.table_mut(table)?;
        let row: Row = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some(missing) = row.keys().find(|c| !entry.columns.contains(*c)) {
            return Err(DbError::does_not_exist(format!(
                "column \"{missing}\" of relation \"{table}\" does not exist"
            )));
        }
        entry.rows.push(row);
        Ok(())
    }

    /// Names of all tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.catalog.tables.keys().cloned().collect()
    }

    /// Whether a table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.catalog.tables.contains_key(table)
    }

    /// Column names of a table in declaration order.
    pub fn columns(&self, table: &str) -> Option<Vec<String>> {
        self.catalog.tables.get(table).map(|t| t.columns.clone())
    }

    /// Rows of a table.
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.catalog.tables.get(table).map(|t| t.rows.as_slice())
    }

    /// Table name to column names, for comparing schema shapes.
    pub fn schema(&self) -> BTreeMap<String, Vec<String>> {
        self.catalog
            .tables
            .iter()
            .map(|(name, t)| (name.clone(), t.columns.clone()))
            .collect()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn table(&self, table: &str) -> Result<&MemTable, DbError> {
        self.catalog.tables.get(table).ok_or_else(|| missing(table))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemTable, DbError> {
        self.catalog
            .tables
            .get_mut(table)
            .ok_or_else(|| missing(table))
    }

    fn create(&mut self, table: &Table) -> Result<(), DbError> {
        if self.has_table(&table.name) {
            return Err(DbError::already_exists(format!(
                "relation \"{}\" already exists",
                table.name
            )));
        }
        let references: Vec<String> = table.referenced_tables().map(str::to_string).collect();
        if let Some(absent) = references.iter().find(|t| !self.has_table(t)) {
            return Err(missing(absent));
        }
        self.catalog.tables.insert(
            table.name.clone(),
            MemTable {
                columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                references,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&mut self, table: &str) -> Result<(), DbError> {
        self.table(table)?;
        if let Some((dependent, _)) = self
            .catalog
            .tables
            .iter()
            .find(|(name, t)| name.as_str() != table && t.references.iter().any(|r| r == table))
        {
            return Err(DbError::other(format!(
                "cannot drop table {table} because table {dependent} depends on it"
            )));
        }
        self.catalog.tables.remove(table);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), DbError> {
        self.table(from)?;
        if self.has_table(to) {
            return Err(DbError::already_exists(format!(
                "relation \"{to}\" already exists"
            )));
        }
        if let Some(entry) = self.catalog.tables.remove(from) {
            self.catalog.tables.insert(to.to_string(), entry);
        }
        // Foreign keys follow the renamed table.
        for entry in self.catalog.tables.values_mut() {
            for reference in entry.references.iter_mut().filter(|r| r.as_str() == from) {
                *reference = to.to_string();
            }
        }
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &Column) -> Result<(), DbError> {
        let entry = self.table_mut(table)?;
        if entry.columns.contains(&column.name) {
            return Err(DbError::already_exists(format!(
                "column \"{}\" of relation \"{table}\" already exists",
                column.name
            )));
        }
        entry.columns.push(column.name.clone());
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), DbError> {
        let entry = self.table_mut(table)?;
        let Some(position) = entry.columns.iter().position(|c| c == column) else {
            return Err(DbError::does_not_exist(format!(
                "column \"{column}\" of relation \"{table}\" does not exist"
            )));
        };
        entry.columns.remove(position);
        for row in &mut entry.rows {
            row.remove(column);
        }
        Ok(())
    }

    fn ledger_mut(&mut self) -> Result<&mut BTreeMap<SchemaVersion, AppliedMigration>, DbError> {
        self.catalog
            .ledger
            .as_mut()
            .ok_or_else(|| DbError::does_not_exist("migration ledger does not exist"))
    }
}

fn missing(table: &str) -> DbError {
    DbError::does_not_exist(format!("relation \"{table}\" does not exist"))
}

#[async_trait]
impl SchemaConnection for InMemoryConnection {
    async fn begin(&mut self) -> Result<(), DbError> {
        if self.snapshot.is_some() {
            return Err(DbError::other("a transaction is already in progress"));
        }
        self.snapshot = Some(self.catalog.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| DbError::other("no transaction in progress"))
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        match self.snapshot.take() {
            Some(snapshot) => self.catalog = snapshot,
            None => log::debug!("rollback without a transaction in progress"),
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, DbError> {
        Err(DbError::other(format!(
            "raw SQL is not supported by the in-memory connection: {sql}"
        )))
    }

    async fn apply(&mut self, op: &SchemaOp) -> Result<(), DbError> {
        log::debug!("in-memory: {op}");
        match op {
            SchemaOp::CreateTable(table) => self.create(table),
            SchemaOp::DropTable { table } => self.drop_table(table),
            SchemaOp::RenameTable { from, to } => self.rename(from, to),
            SchemaOp::AddColumn { table, column } => self.add_column(table, column),
            SchemaOp::DropColumn { table, column } => self.drop_column(table, column),
        }
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool, DbError> {
        Ok(self.has_table(table))
    }

    async fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, DbError> {
        Ok(self
            .catalog
            .tables
            .get(table)
            .is_some_and(|t| t.columns.iter().any(|c| c == column)))
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64, DbError> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn count_values(&mut self, table: &str, column: &str) -> Result<u64, DbError> {
        let entry = self.table(table)?;
        if !entry.columns.iter().any(|c| c == column) {
            return Err(DbError::does_not_exist(format!(
                "column \"{column}\" of relation \"{table}\" does not exist"
            )));
        }
        Ok(entry.rows.iter().filter(|row| row.contains_key(column)).count() as u64)
    }
}

#[async_trait]
impl MigrationLedger for InMemoryConnection {
    async fn ensure_ledger(&mut self) -> Result<(), DbError> {
        self.catalog.ledger.get_or_insert_with(BTreeMap::new);
        Ok(())
    }

    async fn applied(&mut self) -> Result<Vec<AppliedMigration>, DbError> {
        Ok(self
            .catalog
            .ledger
            .as_ref()
            .map(|ledger| ledger.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn record_applied(
        &mut self,
        version: SchemaVersion,
        name: &str,
        checksum: &str,
    ) -> Result<(), DbError> {
        let ledger = self.ledger_mut()?;
        if ledger.contains_key(&version) {
            return Err(DbError::other(format!(
                "duplicate key value violates unique constraint: version {version}"
            )));
        }
        ledger.insert(
            version,
            AppliedMigration {
                version,
                name: name.to_string(),
                applied_at: Utc::now(),
                checksum: checksum.to_string(),
            },
        );
        Ok(())
    }

    async fn remove_applied(&mut self, version: SchemaVersion) -> Result<(), DbError> {
        self.ledger_mut()?.remove(&version);
        Ok(())
    }
}
