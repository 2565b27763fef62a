//! Typed schema definitions and DDL operations.
//!
//! Migration steps describe their schema changes as [`SchemaOp`] values and
//! hand them to a [`SchemaConnection`](crate::connection::SchemaConnection),
//! which either renders them to SQL or applies them directly.

use std::fmt;

use crate::error::DbErrorKind;

/// Column data types understood by every connection provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 32 bit integer.
    Integer,
    /// 64 bit integer.
    BigInteger,
    /// Auto-incrementing integer, normally a primary key.
    Serial,
    /// Unbounded text.
    Text,
    /// Bounded text.
    Varchar(u32),
    /// Timestamp without time zone.
    Timestamp,
    /// Boolean flag.
    Boolean,
}

/// A foreign key reference from a column to another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// The referenced table.
    pub table: String,
    /// The referenced column.
    pub column: String,
    /// Delete referencing rows when the referenced row goes away.
    pub on_delete_cascade: bool,
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
    /// Whether `NULL` is allowed.
    pub nullable: bool,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Default value as a SQL literal.
    pub default: Option<String>,
    /// Foreign key reference.
    pub references: Option<ForeignKey>,
}

impl Column {
    /// A nullable column with no constraints.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    /// Marks the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets a default value, given as a SQL literal (e.g. `'./plan.sh'`).
    pub fn default_sql(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    /// Adds a foreign key reference.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
            on_delete_cascade: false,
        });
        self
    }

    /// Adds a foreign key reference that cascades deletes.
    pub fn references_cascade(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
            on_delete_cascade: true,
        });
        self
    }
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Unique constraints, each a list of column names.
    pub unique: Vec<Vec<String>>,
}

impl Table {
    /// An empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            unique: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds a unique constraint over the given columns.
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique.push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Tables referenced by foreign keys of this table.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| fk.table.as_str()))
    }
}

/// A single DDL operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOp {
    /// Create a table.
    CreateTable(Table),
    /// Drop a table.
    DropTable {
        /// Table to drop.
        table: String,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a column to a table.
    AddColumn {
        /// Table to alter.
        table: String,
        /// Column to add.
        column: Column,
    },
    /// Drop a column from a table.
    DropColumn {
        /// Table to alter.
        table: String,
        /// Column to drop.
        column: String,
    },
}

impl SchemaOp {
    /// Shorthand for [`SchemaOp::DropTable`].
    pub fn drop_table(table: impl Into<String>) -> Self {
        Self::DropTable {
            table: table.into(),
        }
    }

    /// Shorthand for [`SchemaOp::RenameTable`].
    pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::RenameTable {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Shorthand for [`SchemaOp::AddColumn`].
    pub fn add_column(table: impl Into<String>, column: Column) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Shorthand for [`SchemaOp::DropColumn`].
    pub fn drop_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Whether a failure of this kind means the operation's effect is already
    /// in place.
    ///
    /// Creations only tolerate "already exists"; a missing foreign key target
    /// or table is a real failure. Drops only tolerate "does not exist". A
    /// rename tolerates both: the source is gone or the target is taken.
    pub fn tolerates(&self, kind: DbErrorKind) -> bool {
        match self {
            SchemaOp::CreateTable(_) | SchemaOp::AddColumn { .. } => {
                kind == DbErrorKind::AlreadyExists
            }
            SchemaOp::DropTable { .. } | SchemaOp::DropColumn { .. } => {
                kind == DbErrorKind::DoesNotExist
            }
            SchemaOp::RenameTable { .. } => matches!(
                kind,
                DbErrorKind::AlreadyExists | DbErrorKind::DoesNotExist
            ),
        }
    }
}

impl fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOp::CreateTable(table) => write!(f, "create table {}", table.name),
            SchemaOp::DropTable { table } => write!(f, "drop table {table}"),
            SchemaOp::RenameTable { from, to } => write!(f, "rename table {from} to {to}"),
            SchemaOp::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            SchemaOp::DropColumn { table, column } => write!(f, "drop column {table}.{column}"),
        }
    }
}

/// What a step found when probing the live schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaShape {
    /// Neither the shape the step migrates from nor the one it produces.
    Unknown,
    /// The shape the step migrates from.
    Legacy,
    /// The shape the step produces (possibly missing incremental changes).
    Current,
}
