//! The workflow database's migrations.
//!
//! | version | step              |
//! |---------|-------------------|
//! | 1       | [`Baseline`]       |
//! | 2       | [`EnsembleTables`] |

use stratum_core::SchemaVersion;
use stratum_core::error::MigrationError;
use stratum_core::registry::Registry;

mod v001_baseline;
mod v002_ensemble_tables;

pub use v001_baseline::Baseline;
pub use v002_ensemble_tables::EnsembleTables;

/// The newest version of the workflow database.
pub const LATEST: SchemaVersion = SchemaVersion::new(2);

/// Builds the registry of every workflow database migration.
pub fn registry() -> Result<Registry, MigrationError> {
    Registry::new()
        .with_step(1, || Box::new(Baseline))?
        .with_step(2, || Box::new(EnsembleTables))
}
