//! Down command implementation

use anyhow::Result;

use crate::cli::{DownArgs, GlobalArgs};
use crate::commands::common::{for_each_database, plural, print_migrations};

/// Execute the down command
pub(crate) fn execute(args: &DownArgs, global: &GlobalArgs) -> Result<()> {
    for_each_database(global, |migrator, _| {
        let plan = migrator.plan_down(args.target.as_deref(), args.from_disk)?;
        if plan.is_empty() {
            println!("  Nothing to roll back");
            return Ok(());
        }
        print_migrations("Rolling back", &plan.migrations);
        let count = migrator.execute(&plan, |m| println!("    ok  {}", m.filename))?;
        println!("  Rolled back {count} migration{}", plural(count));
        Ok(())
    })
}
