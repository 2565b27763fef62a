//! # Stratum postgres provider
//!
//! Runs stratum migrations against postgres through sqlx. Typed schema
//! operations are rendered to DDL by [`ddl::render`] and database errors are
//! classified by SQLSTATE so that migration steps can tell benign
//! "already exists"/"does not exist" failures from real ones.

#![deny(missing_docs)]

/// Provider configuration
pub mod config;

/// The postgres connection provider
pub mod connection;

/// DDL rendering
pub mod ddl;

/// SQLSTATE classification
pub mod error;

pub use config::{DEFAULT_LEDGER_TABLE, PgConfig};
pub use connection::PgSchemaConnection;
