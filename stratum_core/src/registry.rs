//! The ordered set of known migrations.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::ops::Bound;

use crate::error::MigrationError;
use crate::step::MigrationStep;
use crate::{Direction, SchemaVersion};

/// Builds a fresh step instance for every migration run.
pub type StepFactory = Box<dyn Fn() -> Box<dyn MigrationStep> + Send + Sync>;

/// Maps schema versions to the factories of the steps that reach them.
#[derive(Default)]
pub struct Registry {
    steps: BTreeMap<SchemaVersion, StepFactory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the step that upgrades the schema to `version`.
    pub fn register<F>(
        &mut self,
        version: impl Into<SchemaVersion>,
        factory: F,
    ) -> Result<&mut Self, MigrationError>
    where
        F: Fn() -> Box<dyn MigrationStep> + Send + Sync + 'static,
    {
        let version = version.into();
        if version <= SchemaVersion::BASE {
            return Err(MigrationError::InvalidVersion(version));
        }
        match self.steps.entry(version) {
            btree_map::Entry::Occupied(_) => Err(MigrationError::DuplicateVersion(version)),
            btree_map::Entry::Vacant(slot) => {
                slot.insert(Box::new(factory));
                Ok(self)
            }
        }
    }

    /// Builder flavour of [`Registry::register`].
    pub fn with_step<F>(
        mut self,
        version: impl Into<SchemaVersion>,
        factory: F,
    ) -> Result<Self, MigrationError>
    where
        F: Fn() -> Box<dyn MigrationStep> + Send + Sync + 'static,
    {
        self.register(version, factory)?;
        Ok(self)
    }

    /// Returns the factory registered for `version`.
    pub fn get(&self, version: SchemaVersion) -> Result<&StepFactory, MigrationError> {
        self.steps
            .get(&version)
            .ok_or(MigrationError::UnknownVersion(version))
    }

    /// Instantiates the step registered for `version`.
    pub fn step(&self, version: SchemaVersion) -> Result<Box<dyn MigrationStep>, MigrationError> {
        Ok((self.get(version)?)())
    }

    /// Whether a step is registered for `version`.
    pub fn contains(&self, version: SchemaVersion) -> bool {
        self.steps.contains_key(&version)
    }

    /// The highest registered version, or [`SchemaVersion::BASE`] when empty.
    pub fn latest(&self) -> SchemaVersion {
        self.steps
            .keys()
            .next_back()
            .copied()
            .unwrap_or(SchemaVersion::BASE)
    }

    /// The registered version right below `version`, or [`SchemaVersion::BASE`].
    pub fn predecessor(&self, version: SchemaVersion) -> SchemaVersion {
        self.steps
            .range(..version)
            .next_back()
            .map(|(v, _)| *v)
            .unwrap_or(SchemaVersion::BASE)
    }

    /// All registered versions in ascending order.
    pub fn versions(&self) -> impl DoubleEndedIterator<Item = SchemaVersion> + '_ {
        self.steps.keys().copied()
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no step is registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The versions to walk when moving the schema from `from` to `to`.
    ///
    /// Upgrading yields the registered versions in `(from, to]` in ascending
    /// order; downgrading yields those in `(to, from]` in descending order,
    /// each one being the version whose step has to be reverted.
    pub fn range(&self, from: SchemaVersion, to: SchemaVersion) -> VersionRange<'_> {
        let direction = Direction::between(from, to);
        let (low, high) = match direction {
            Direction::Upgrade => (from, to),
            Direction::Downgrade => (to, from),
        };
        VersionRange {
            inner: self
                .steps
                .range((Bound::Excluded(low), Bound::Included(high))),
            direction,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("versions", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lazy iterator over the versions between two schema states.
///
/// Cloning restarts the walk from the same point.
#[derive(Clone)]
pub struct VersionRange<'a> {
    inner: btree_map::Range<'a, SchemaVersion, StepFactory>,
    direction: Direction,
}

impl VersionRange<'_> {
    /// The direction of travel.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Iterator for VersionRange<'_> {
    type Item = SchemaVersion;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.direction {
            Direction::Upgrade => self.inner.next(),
            Direction::Downgrade => self.inner.next_back(),
        };
        next.map(|(version, _)| *version)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
