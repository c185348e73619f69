//! Strongly-typed migration filename.
//!
//! A migration filename is `<YYYYMMDDHHMMSS>-<name>.migration.<ext>`. It is the
//! identity and the sort key of a migration, and the migration name is derived
//! from it alone.

use crate::error::{CoreError, CoreResult};
use regex::Regex;
use std::sync::OnceLock;

static FILENAME_RE: OnceLock<Regex> = OnceLock::new();

fn filename_re() -> &'static Regex {
    FILENAME_RE.get_or_init(|| {
        Regex::new(r"^(\d{14})-([A-Za-z0-9_-]+)\.migration\.([A-Za-z0-9]+)$")
            .expect("valid regex literal")
    })
}

/// A validated migration filename.
///
/// Ordering is plain lexicographic ordering of the filename, which orders by
/// timestamp first because the timestamp has a fixed width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct MigrationFilename(String);

impl<'de> serde::Deserialize<'de> for MigrationFilename {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MigrationFilename::parse(s).map_err(serde::de::Error::custom)
    }
}

impl MigrationFilename {
    /// Validate `filename` against the naming contract.
    pub fn parse(filename: impl Into<String>) -> CoreResult<Self> {
        let filename = filename.into();
        if filename_re().is_match(&filename) {
            Ok(Self(filename))
        } else {
            Err(CoreError::InvalidMigrationFilename { filename })
        }
    }

    /// Like [`parse`](Self::parse) but returns `None` for non-matching names.
    pub fn try_new(filename: impl Into<String>) -> Option<Self> {
        Self::parse(filename).ok()
    }

    fn part(&self, index: usize) -> &str {
        filename_re()
            .captures(&self.0)
            .and_then(|caps| caps.get(index))
            .map_or("", |m| m.as_str())
    }

    /// The 14-digit `YYYYMMDDHHMMSS` prefix.
    pub fn timestamp(&self) -> &str {
        self.part(1)
    }

    /// The migration name, e.g. `init` for `20240101000000-init.migration.js`.
    pub fn name(&self) -> &str {
        self.part(2)
    }

    /// The script extension without the leading dot.
    pub fn extension(&self) -> &str {
        self.part(3)
    }

    /// True when `target` names this migration, either by derived name or by
    /// full filename.
    pub fn matches_target(&self, target: &str) -> bool {
        self.name() == target || self.0 == target
    }

    /// Return the underlying filename as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for MigrationFilename {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MigrationFilename {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for MigrationFilename {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for MigrationFilename {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MigrationFilename {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for MigrationFilename {
    type Error = CoreError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl PartialEq<str> for MigrationFilename {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for MigrationFilename {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "migration_filename_test.rs"]
mod tests;
