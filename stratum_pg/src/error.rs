//! Mapping of sqlx errors onto [`DbError`].

use stratum_core::error::{DbError, DbErrorKind};

// SQLSTATE codes, see https://www.postgresql.org/docs/current/errcodes-appendix.html
const DUPLICATE_TABLE: &str = "42P07";
const DUPLICATE_COLUMN: &str = "42701";
const DUPLICATE_OBJECT: &str = "42710";
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_COLUMN: &str = "42703";
const UNDEFINED_OBJECT: &str = "42704";

/// Classifies a SQLSTATE code.
pub fn kind_of(code: Option<&str>) -> DbErrorKind {
    match code {
        Some(DUPLICATE_TABLE | DUPLICATE_COLUMN | DUPLICATE_OBJECT) => DbErrorKind::AlreadyExists,
        Some(UNDEFINED_TABLE | UNDEFINED_COLUMN | UNDEFINED_OBJECT) => DbErrorKind::DoesNotExist,
        _ => DbErrorKind::Other,
    }
}

/// Converts a sqlx error, keeping it as the source.
pub fn classify(err: sqlx::Error) -> DbError {
    let kind = match &err {
        sqlx::Error::Database(db) => kind_of(db.code().as_deref()),
        _ => DbErrorKind::Other,
    };
    DbError::new(kind, err.to_string()).with_source(err)
}
