//! # Stratum
//!
//! Versioned schema migrations for the workflow-tracking database.
//!
//! The engine lives in `stratum_core`; connection providers are enabled with
//! the `in-memory` and `postgres` features. The [`workflow`] module holds the
//! migration steps of the workflow database.

#![deny(missing_docs)]

/// Migration steps for the workflow database.
pub mod workflow;

#[cfg(feature = "in-memory")]
/// In-memory connection provider.
pub mod mem {
    //! Re-exports `stratum_mem`.
    pub use stratum_mem::*;
}

#[cfg(feature = "postgres")]
/// Postgres connection provider.
pub mod pg {
    //! Re-exports `stratum_pg`.
    pub use stratum_pg::*;
}

pub use stratum_core::{
    Direction, SchemaVersion, connection, error, ledger, migrator, registry, schema, step,
};

pub mod prelude {
    //! The prelude module for the `stratum` crate.
    pub use stratum_core::prelude::*;

    pub use super::workflow::{Baseline, EnsembleTables};

    #[cfg(feature = "in-memory")]
    pub use super::mem::*;
    #[cfg(feature = "postgres")]
    pub use super::pg::*;
}
