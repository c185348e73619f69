//! Status command implementation

use anyhow::Result;

use crate::cli::GlobalArgs;
use crate::commands::common::{for_each_database, print_migrations};

/// Execute the status command
pub(crate) fn execute(global: &GlobalArgs) -> Result<()> {
    for_each_database(global, |migrator, _| {
        let status = migrator.status()?;
        println!("  Applied:");
        if status.applied.is_empty() {
            println!("    (none)");
        }
        for migration in &status.applied {
            let applied_at = migration
                .applied_at
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default();
            println!("    {}  {applied_at}", migration.filename);
        }
        print_migrations("Pending", &status.pending);
        Ok(())
    })
}
