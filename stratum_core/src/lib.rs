//! # Stratum core
//!
//! Building blocks for versioned schema migrations: the connection provider
//! contract, typed DDL operations, the per-version [`MigrationStep`] trait, the
//! version [`Registry`] and the [`Migrator`] engine.
//!
//! [`MigrationStep`]: step::MigrationStep
//! [`Registry`]: registry::Registry
//! [`Migrator`]: migrator::Migrator

#![deny(missing_docs)]

mod version;

/// The connection provider contract
pub mod connection;

/// Error types
pub mod error;

/// The applied-migrations ledger
pub mod ledger;

/// The migration engine
pub mod migrator;

/// The version registry
pub mod registry;

/// Typed schema definitions
pub mod schema;

/// The migration step contract
pub mod step;

pub use version::{Direction, SchemaVersion};

pub mod prelude {
    //! The prelude module for the `stratum_core` crate.
    pub use super::connection::SchemaConnection;
    pub use super::error::{DbError, DbErrorKind, MigrationError};
    pub use super::ledger::{AppliedMigration, MigrationLedger};
    pub use super::migrator::{
        MigrationReport, MigrationState, Migrator, MigratorConfig, StepRecord, Target,
        VersionStatus,
    };
    pub use super::registry::{Registry, StepFactory, VersionRange};
    pub use super::schema::{Column, ColumnType, ForeignKey, SchemaOp, SchemaShape, Table};
    pub use super::step::{DdlOutcome, DowngradeSupport, MigrationStep, Vacancy, apply_ddl, vacancy};
    pub use super::{Direction, SchemaVersion};
}
