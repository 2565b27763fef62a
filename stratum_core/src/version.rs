//! Schema version numbers.

use std::fmt;

/// An integer identifying a schema state.
///
/// Versions are totally ordered. [`SchemaVersion::BASE`] stands for a database
/// on which no migration has been recorded; every registered migration uses a
/// version of 1 or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SchemaVersion(i64);

impl SchemaVersion {
    /// The version of a database with no applied migrations.
    pub const BASE: SchemaVersion = SchemaVersion(0);

    /// Wraps a raw version number.
    pub const fn new(version: i64) -> Self {
        Self(version)
    }

    /// Returns the raw version number.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this is [`SchemaVersion::BASE`].
    pub const fn is_base(self) -> bool {
        self.0 == 0
    }
}

impl From<i64> for SchemaVersion {
    fn from(version: i64) -> Self {
        Self(version)
    }
}

impl From<i32> for SchemaVersion {
    fn from(version: i32) -> Self {
        Self(i64::from(version))
    }
}

impl From<SchemaVersion> for i64 {
    fn from(version: SchemaVersion) -> Self {
        version.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of travel through the version history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards higher versions.
    Upgrade,
    /// Towards lower versions.
    Downgrade,
}

impl Direction {
    /// The direction needed to go from `from` to `to`. Equal versions count as an upgrade.
    pub fn between(from: SchemaVersion, to: SchemaVersion) -> Self {
        if to >= from {
            Direction::Upgrade
        } else {
            Direction::Downgrade
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upgrade => f.write_str("upgrade"),
            Direction::Downgrade => f.write_str("downgrade"),
        }
    }
}
