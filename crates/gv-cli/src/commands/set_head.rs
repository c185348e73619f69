//! Set-head command implementation

use anyhow::Result;

use crate::cli::{GlobalArgs, SetHeadArgs};
use crate::commands::common::{for_each_database, plural, print_migrations};

/// Execute the set-head command
pub(crate) fn execute(args: &SetHeadArgs, global: &GlobalArgs) -> Result<()> {
    for_each_database(global, |migrator, _| {
        let head = migrator.set_head(&args.target)?;
        print_migrations("Applied set", &head);
        println!(
            "  Marked {} migration{} as applied without running scripts",
            head.len(),
            plural(head.len())
        );
        Ok(())
    })
}
