//! Error types shared by connection providers, steps and the migrator.

use crate::SchemaVersion;

/// Classification of a [`DbError`] reported by a connection provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The object a statement creates or renames to is already there.
    AlreadyExists,
    /// The object a statement targets is not there.
    DoesNotExist,
    /// Anything else.
    Other,
}

/// An error reported by a connection provider.
///
/// Providers classify the underlying driver error into a [`DbErrorKind`] so the
/// migration layer can tell benign schema errors apart from real failures
/// without matching on driver-specific types.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct DbError {
    kind: DbErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DbError {
    /// Creates an error of the given kind.
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Creates an [`DbErrorKind::AlreadyExists`] error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::AlreadyExists, message)
    }

    /// Creates a [`DbErrorKind::DoesNotExist`] error.
    pub fn does_not_exist(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::DoesNotExist, message)
    }

    /// Creates a [`DbErrorKind::Other`] error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Other, message)
    }

    /// Attaches the underlying driver error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The classification of this error.
    pub fn kind(&self) -> DbErrorKind {
        self.kind
    }

    /// The human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the error only says that an object already exists or does not
    /// exist. Such errors are treated as an already satisfied schema change.
    pub fn is_benign(&self) -> bool {
        matches!(
            self.kind,
            DbErrorKind::AlreadyExists | DbErrorKind::DoesNotExist
        )
    }
}

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A migration step failed on a database error. Its transaction was rolled back.
    #[error("Migration {version} ({name}) failed: {source}")]
    MigrationFailed {
        /// The version of the migration that failed.
        version: SchemaVersion,
        /// The name of the migration.
        name: String,
        /// The underlying database error.
        #[source]
        source: DbError,
    },

    /// A table the migration needs to take over exists and holds data.
    #[error("Table {table} already exists and is not empty ({rows} rows)")]
    ConflictingState {
        /// The conflicting table.
        table: String,
        /// Number of rows found in it.
        rows: u64,
    },

    /// Neither the schema shape a step migrates from nor the one it migrates to was found.
    #[error("Unexpected schema state for version {version}: {detail}")]
    UnexpectedSchemaState {
        /// The version of the step that inspected the schema.
        version: SchemaVersion,
        /// What was found instead.
        detail: String,
    },

    /// No migration is registered for this version.
    #[error("Unknown schema version {0}")]
    UnknownVersion(SchemaVersion),

    /// A migration was registered twice for the same version.
    #[error("Schema version {0} is already registered")]
    DuplicateVersion(SchemaVersion),

    /// Migrations must use versions of 1 and above.
    #[error("Invalid schema version {0}: versions start at 1")]
    InvalidVersion(SchemaVersion),

    /// A downgrade was requested through a migration that cannot be reversed.
    #[error("Migration {version} ({name}) does not support downgrade")]
    DowngradeUnsupported {
        /// The version of the irreversible migration.
        version: SchemaVersion,
        /// The name of the migration.
        name: String,
    },

    /// A migration's checksum doesn't match what was previously applied.
    #[error("Migration {version} ({name}) checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        /// The version of the migration with mismatched checksum.
        version: SchemaVersion,
        /// The name of the migration.
        name: String,
        /// The checksum that was expected (from the database).
        expected: String,
        /// The checksum that was found (from the code).
        found: String,
    },
}

impl MigrationError {
    /// Creates a [`MigrationError::UnexpectedSchemaState`] error.
    pub fn unexpected_state(version: impl Into<SchemaVersion>, detail: impl Into<String>) -> Self {
        Self::UnexpectedSchemaState {
            version: version.into(),
            detail: detail.into(),
        }
    }
}
