//! Persisted record describing one applied migration.

use crate::migration_filename::MigrationFilename;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the applied set.
///
/// Records are immutable once written; drivers replace the whole applied set
/// at once instead of patching single entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationMetadata {
    /// Identity and sort key
    pub filename: MigrationFilename,

    /// Compiled bundle text that was executed
    pub source: String,

    /// Application time, millisecond precision
    pub applied_at: DateTime<Utc>,
}

impl MigrationMetadata {
    /// Build a record, truncating `applied_at` to whole milliseconds so it
    /// survives every backend's timestamp storage unchanged.
    pub fn new(filename: MigrationFilename, source: impl Into<String>, applied_at: DateTime<Utc>) -> Self {
        Self {
            filename,
            source: source.into(),
            applied_at: truncate_to_millis(applied_at),
        }
    }

    /// Migration name derived from the filename.
    pub fn name(&self) -> &str {
        self.filename.name()
    }
}

/// Drop sub-millisecond precision from a timestamp.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// Current time at millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Sort records ascending by filename, the order every read returns.
pub fn sort_by_filename(records: &mut [MigrationMetadata]) {
    records.sort_by(|a, b| a.filename.cmp(&b.filename));
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod tests;
