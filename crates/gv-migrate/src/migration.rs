//! Migration records: a filename with its compiled script.

use chrono::{DateTime, Utc};
use gv_core::{MigrationFilename, MigrationMetadata};
use gv_script::Script;

/// A migration file or applied record with its compiled script.
///
/// Rebuilt on every command invocation and never persisted itself; the
/// applied set only stores [`MigrationMetadata`].
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub filename: MigrationFilename,
    pub script: Script,
    /// Set for migrations in the applied set
    pub applied_at: Option<DateTime<Utc>>,
}

impl Migration {
    /// A migration found on disk that has not been applied.
    pub fn pending(filename: MigrationFilename, script: Script) -> Self {
        Self {
            filename,
            script,
            applied_at: None,
        }
    }

    /// An applied migration, its script rebuilt from the persisted source.
    pub fn applied(metadata: MigrationMetadata) -> Self {
        let script = Script::from_source(metadata.filename.as_str(), metadata.source);
        Self {
            filename: metadata.filename,
            script,
            applied_at: Some(metadata.applied_at),
        }
    }

    /// Name derived from the filename.
    pub fn name(&self) -> &str {
        self.filename.name()
    }

    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }

    /// Applied-set record for this migration. Already applied migrations keep
    /// their original time; others are stamped with `now`.
    pub fn to_metadata(&self, now: DateTime<Utc>) -> MigrationMetadata {
        MigrationMetadata::new(
            self.filename.clone(),
            self.script.source(),
            self.applied_at.unwrap_or(now),
        )
    }
}
