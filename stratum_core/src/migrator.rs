//! The migration engine.
//!
//! The [`Migrator`] walks a [`Registry`] from the version recorded in the
//! database ledger to a target version, running each step in its own
//! transaction.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stratum_core::prelude::*;
//!
//! let mut migrator = Migrator::new(registry);
//!
//! // Run all pending migrations
//! let report = migrator.upgrade(&mut conn, false).await?;
//! println!("Applied {} migrations", report.steps.len());
//!
//! // Check current version
//! println!("Current version: {}", migrator.current_version(&mut conn).await?);
//! ```
//!
//! # Transactions
//!
//! Each version transition runs inside its own transaction. A successful step
//! is committed together with its ledger entry before the next one starts. A
//! failing step is rolled back and the migrator stops; versions committed
//! before it stay applied.
//!
//! Running two migrators against the same database at once is not supported.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::connection::SchemaConnection;
use crate::error::MigrationError;
use crate::ledger::{AppliedMigration, MigrationLedger};
use crate::registry::Registry;
use crate::schema::SchemaShape;
use crate::step::{DowngradeSupport, MigrationStep};
use crate::{Direction, SchemaVersion};

/// The version a migration run should end at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The highest registered version.
    Latest,
    /// A specific version. [`SchemaVersion::BASE`] reverts everything.
    Version(SchemaVersion),
}

impl From<SchemaVersion> for Target {
    fn from(version: SchemaVersion) -> Self {
        Target::Version(version)
    }
}

/// Error returned when parsing a [`Target`] fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid migration target {0:?}: expected \"latest\" or a version number")]
pub struct ParseTargetError(String);

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Target::Latest);
        }
        s.parse::<i64>()
            .ok()
            .filter(|v| *v >= 0)
            .map(|v| Target::Version(SchemaVersion::new(v)))
            .ok_or_else(|| ParseTargetError(s.to_string()))
    }
}

/// Where the migrator stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// No migration has been recorded in the database.
    NotStarted,
    /// The database is at this version.
    AtVersion(SchemaVersion),
    /// A step is running.
    Migrating {
        /// Version before the step.
        from: SchemaVersion,
        /// Version after the step.
        to: SchemaVersion,
    },
    /// A step failed and was rolled back. The migrator stopped.
    Failed {
        /// The version of the step that failed.
        version: SchemaVersion,
        /// Description of the failure.
        cause: String,
    },
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::NotStarted => f.write_str("not started"),
            MigrationState::AtVersion(v) => write!(f, "at version {v}"),
            MigrationState::Migrating { from, to } => write!(f, "migrating {from} -> {to}"),
            MigrationState::Failed { version, cause } => {
                write!(f, "failed at version {version}: {cause}")
            }
        }
    }
}

/// Configuration for the [`Migrator`].
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Log target used for the migrator's own records.
    ///
    /// Default: `stratum::migrator`
    pub log_target: Cow<'static, str>,

    /// Compare ledger checksums against the registered steps before running.
    ///
    /// Default: `true`
    pub verify_checksums: bool,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            log_target: Cow::Borrowed("stratum::migrator"),
            verify_checksums: true,
        }
    }
}

/// One step executed by a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// The version of the step.
    pub version: SchemaVersion,
    /// The name of the step.
    pub name: String,
    /// Whether the step was applied or reverted.
    pub direction: Direction,
    /// The step was forward-only and skipped by a forced downgrade.
    pub skipped: bool,
}

/// Outcome of a successful migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the run.
    pub from: SchemaVersion,
    /// Version after the run.
    pub to: SchemaVersion,
    /// Steps executed, in order.
    pub steps: Vec<StepRecord>,
}

impl MigrationReport {
    /// Whether the run changed nothing.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    /// The versions of the executed steps, in order.
    pub fn versions(&self) -> Vec<SchemaVersion> {
        self.steps.iter().map(|s| s.version).collect()
    }
}

/// Status of one registered version.
#[derive(Debug, Clone)]
pub struct VersionStatus {
    /// The registered version.
    pub version: SchemaVersion,
    /// The step name.
    pub name: &'static str,
    /// The ledger entry, when applied.
    pub applied: Option<AppliedMigration>,
    /// The shape the step detects in the live schema.
    pub shape: SchemaShape,
}

/// Brings a database to a target schema version.
pub struct Migrator {
    registry: Registry,
    config: MigratorConfig,
    state: MigrationState,
}

impl Migrator {
    /// Creates a migrator over the given registry with default configuration.
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, MigratorConfig::default())
    }

    /// Creates a migrator with explicit configuration.
    pub fn with_config(registry: Registry, config: MigratorConfig) -> Self {
        Self {
            registry,
            config,
            state: MigrationState::NotStarted,
        }
    }

    /// The registry this migrator walks.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The state reached by the last operation.
    pub fn state(&self) -> &MigrationState {
        &self.state
    }

    fn log_target(&self) -> &str {
        &self.config.log_target
    }

    /// Returns the current migration version ([`SchemaVersion::BASE`] if no migrations applied).
    pub async fn current_version<C>(&self, conn: &mut C) -> Result<SchemaVersion, MigrationError>
    where
        C: MigrationLedger,
    {
        Ok(self
            .applied(conn)
            .await?
            .last()
            .map(|m| m.version)
            .unwrap_or(SchemaVersion::BASE))
    }

    /// Returns list of all applied migrations, ordered by version.
    pub async fn applied<C>(&self, conn: &mut C) -> Result<Vec<AppliedMigration>, MigrationError>
    where
        C: MigrationLedger,
    {
        conn.ensure_ledger().await?;
        let mut applied = conn.applied().await?;
        applied.sort_by_key(|m| m.version);
        Ok(applied)
    }

    /// Returns the versions an upgrade to the latest version would run.
    pub async fn pending<C>(&self, conn: &mut C) -> Result<Vec<SchemaVersion>, MigrationError>
    where
        C: MigrationLedger,
    {
        let current = self.current_version(conn).await?;
        Ok(self.registry.range(current, self.registry.latest()).collect())
    }

    /// Reports every registered version with its ledger entry and detected shape.
    pub async fn status<C>(&self, conn: &mut C) -> Result<Vec<VersionStatus>, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        let mut applied = self.applied(conn).await?;
        let mut statuses = Vec::with_capacity(self.registry.len());
        for version in self.registry.versions() {
            let step = self.registry.step(version)?;
            let shape = step.shape(&mut *conn).await?;
            let entry = applied
                .iter()
                .position(|m| m.version == version)
                .map(|i| applied.remove(i));
            statuses.push(VersionStatus {
                version,
                name: step.name(),
                applied: entry,
                shape,
            });
        }
        Ok(statuses)
    }

    /// Runs all pending migrations.
    pub async fn upgrade<C>(
        &mut self,
        conn: &mut C,
        force: bool,
    ) -> Result<MigrationReport, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        self.migrate(conn, Target::Latest, force).await
    }

    /// Moves the database to `target`, upgrading or downgrading as needed.
    ///
    /// Registry and ledger problems (unknown target, unknown recorded
    /// version, checksum mismatch, irreversible step on a downgrade path) are
    /// reported before any step runs.
    pub async fn migrate<C>(
        &mut self,
        conn: &mut C,
        target: Target,
        force: bool,
    ) -> Result<MigrationReport, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        let target = self.resolve(target)?;
        let applied = self.verified_ledger(conn).await?;
        let current = applied
            .last()
            .map(|m| m.version)
            .unwrap_or(SchemaVersion::BASE);
        self.state = if applied.is_empty() {
            MigrationState::NotStarted
        } else {
            MigrationState::AtVersion(current)
        };

        let mut report = MigrationReport {
            from: current,
            to: target,
            steps: Vec::new(),
        };
        if current == target {
            log::info!(target: self.log_target(), "Schema already at version {current}");
            return Ok(report);
        }

        let range = self.registry.range(current, target);
        let direction = range.direction();
        if direction == Direction::Downgrade {
            self.check_reversible(range.clone(), force)?;
        }

        log::info!(
            target: self.log_target(),
            "Migrating schema from version {current} to {target} ({direction})"
        );

        let versions: Vec<SchemaVersion> = range.collect();
        let mut at = current;
        for version in versions {
            let step = self.registry.step(version)?;
            let to = match direction {
                Direction::Upgrade => version,
                Direction::Downgrade => self.registry.predecessor(version),
            };
            self.state = MigrationState::Migrating { from: at, to };
            let record = self
                .run_step(conn, version, step.as_ref(), direction, force)
                .await?;
            report.steps.push(record);
            at = to;
        }

        self.state = MigrationState::AtVersion(target);
        log::info!(
            target: self.log_target(),
            "Schema at version {target} ({} steps)",
            report.steps.len()
        );
        Ok(report)
    }

    /// Records every registered version up to `version` as applied without
    /// running it.
    ///
    /// Meant for databases whose schema was created outside the migrator.
    /// Returns the number of versions stamped.
    pub async fn baseline<C>(
        &mut self,
        conn: &mut C,
        version: SchemaVersion,
    ) -> Result<usize, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        let version = self.resolve(Target::Version(version))?;
        let applied = self.verified_ledger(conn).await?;

        conn.begin().await?;
        let mut stamped = 0;
        for v in self.registry.range(SchemaVersion::BASE, version) {
            if applied.iter().any(|m| m.version == v) {
                continue;
            }
            let step = self.registry.step(v)?;
            if let Err(e) = conn.record_applied(v, step.name(), &step.checksum(v)).await {
                self.rollback(conn, v).await;
                return Err(e.into());
            }
            stamped += 1;
        }
        conn.commit().await?;

        let current = applied
            .last()
            .map(|m| m.version)
            .unwrap_or(SchemaVersion::BASE)
            .max(version);
        self.state = MigrationState::AtVersion(current);
        log::info!(
            target: self.log_target(),
            "Baselined {stamped} versions up to {version}"
        );
        Ok(stamped)
    }

    fn resolve(&self, target: Target) -> Result<SchemaVersion, MigrationError> {
        match target {
            Target::Latest => Ok(self.registry.latest()),
            Target::Version(v) if v.is_base() || self.registry.contains(v) => Ok(v),
            Target::Version(v) => Err(MigrationError::UnknownVersion(v)),
        }
    }

    async fn verified_ledger<C>(&self, conn: &mut C) -> Result<Vec<AppliedMigration>, MigrationError>
    where
        C: MigrationLedger,
    {
        let applied = self.applied(conn).await?;
        for entry in &applied {
            // A recorded version missing from the registry means the database
            // is newer than this build.
            let step = self.registry.step(entry.version)?;
            if !self.config.verify_checksums {
                continue;
            }
            let found = step.checksum(entry.version);
            if found != entry.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: entry.version,
                    name: entry.name.clone(),
                    expected: entry.checksum.clone(),
                    found,
                });
            }
        }
        Ok(applied)
    }

    fn check_reversible(
        &self,
        versions: impl Iterator<Item = SchemaVersion>,
        force: bool,
    ) -> Result<(), MigrationError> {
        for version in versions {
            let step = self.registry.step(version)?;
            if step.downgrade_support() == DowngradeSupport::Supported {
                continue;
            }
            if !force {
                return Err(MigrationError::DowngradeUnsupported {
                    version,
                    name: step.name().to_string(),
                });
            }
            log::warn!(
                target: self.log_target(),
                "Migration {version} ({}) does not support downgrade; it will be skipped",
                step.name()
            );
        }
        Ok(())
    }

    async fn run_step<C>(
        &mut self,
        conn: &mut C,
        version: SchemaVersion,
        step: &dyn MigrationStep,
        direction: Direction,
        force: bool,
    ) -> Result<StepRecord, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        log::info!(
            target: self.log_target(),
            "Running {direction} {version} ({})...",
            step.name()
        );

        if let Err(e) = conn.begin().await {
            return Err(self.fail(version, step.name(), e.into()));
        }

        let body = Self::step_body(conn, self.log_target(), version, step, direction, force);
        let outcome = match body.await {
            Ok(skipped) => conn
                .commit()
                .await
                .map(|()| skipped)
                .map_err(MigrationError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(skipped) => {
                log::info!(
                    target: self.log_target(),
                    "Migration {version} ({}) {} successfully",
                    step.name(),
                    match direction {
                        Direction::Upgrade => "applied",
                        Direction::Downgrade => "reverted",
                    }
                );
                Ok(StepRecord {
                    version,
                    name: step.name().to_string(),
                    direction,
                    skipped,
                })
            }
            Err(e) => {
                self.rollback(conn, version).await;
                Err(self.fail(version, step.name(), e))
            }
        }
    }

    async fn step_body<C>(
        conn: &mut C,
        log_target: &str,
        version: SchemaVersion,
        step: &dyn MigrationStep,
        direction: Direction,
        force: bool,
    ) -> Result<bool, MigrationError>
    where
        C: SchemaConnection + MigrationLedger,
    {
        match direction {
            Direction::Upgrade => {
                step.update(&mut *conn, force).await?;
                conn.record_applied(version, step.name(), &step.checksum(version))
                    .await?;
                Ok(false)
            }
            Direction::Downgrade => {
                let skipped = step.downgrade_support() == DowngradeSupport::Unsupported;
                if skipped {
                    // Already warned about when the run was planned.
                    log::info!(
                        target: log_target,
                        "Skipping irreversible migration {version} ({})",
                        step.name()
                    );
                } else {
                    step.downgrade(&mut *conn, force).await?;
                }
                conn.remove_applied(version).await?;
                Ok(skipped)
            }
        }
    }

    async fn rollback<C>(&self, conn: &mut C, version: SchemaVersion)
    where
        C: SchemaConnection,
    {
        log::error!(
            target: self.log_target(),
            "Rolling back migration {version}"
        );
        if let Err(e) = conn.rollback().await {
            log::error!(
                target: self.log_target(),
                "Rollback of migration {version} failed: {e}"
            );
        }
    }

    fn fail(&mut self, version: SchemaVersion, name: &str, err: MigrationError) -> MigrationError {
        let err = match err {
            MigrationError::Database(source) => MigrationError::MigrationFailed {
                version,
                name: name.to_string(),
                source,
            },
            other => other,
        };
        self.state = MigrationState::Failed {
            version,
            cause: err.to_string(),
        };
        err
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}
