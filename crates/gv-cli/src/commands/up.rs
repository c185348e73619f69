//! Up command implementation

use anyhow::Result;

use crate::cli::{GlobalArgs, UpArgs};
use crate::commands::common::{for_each_database, plural, print_migrations};

/// Execute the up command
pub(crate) fn execute(args: &UpArgs, global: &GlobalArgs) -> Result<()> {
    for_each_database(global, |migrator, _| {
        let plan = migrator.plan_up(args.target.as_deref())?;
        if plan.is_empty() {
            println!("  Nothing to apply");
            return Ok(());
        }
        print_migrations("Applying", &plan.migrations);
        let count = migrator.execute(&plan, |m| println!("    ok  {}", m.filename))?;
        println!("  Applied {count} migration{}", plural(count));
        Ok(())
    })
}
