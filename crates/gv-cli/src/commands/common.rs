//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use gv_core::{Config, DatabaseConfig};
use gv_migrate::{Migration, Migrator};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; nothing to show the user.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Load `graviton.yml` from `--config`, or search upwards from the working
/// directory.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    let path = match &global.config {
        Some(path) => PathBuf::from(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            Config::discover(&cwd)?
        }
    };
    log::debug!("Using configuration {}", path.display());
    Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Connect to every selected database in configured order and run `command`
/// against it, stopping at the first failure.
pub(crate) fn for_each_database<F>(global: &GlobalArgs, mut command: F) -> Result<()>
where
    F: FnMut(&Migrator<'_>, &DatabaseConfig) -> Result<()>,
{
    let config = load_config(global)?;
    for db in config.select_databases(global.database.as_deref())? {
        println!("{} ({})", db.name, db.kind);
        if let Err(e) = run_on_database(&config.root, db, &mut command) {
            eprintln!("  FAILED: {e:#}");
            return Err(ExitCode(1).into());
        }
    }
    Ok(())
}

fn run_on_database<F>(root: &Path, db: &DatabaseConfig, command: &mut F) -> Result<()>
where
    F: FnMut(&Migrator<'_>, &DatabaseConfig) -> Result<()>,
{
    let mut driver = gv_db::connect_driver(db)?;
    let result = {
        let migrator = Migrator::for_config(driver.as_ref(), db, root);
        command(&migrator, db)
    };
    if let Err(e) = driver.disconnect() {
        log::warn!("Disconnect from '{}' failed: {e}", db.name);
    }
    result
}

/// Print migrations one per line under a heading.
pub(crate) fn print_migrations(heading: &str, migrations: &[Migration]) {
    println!("  {heading}:");
    if migrations.is_empty() {
        println!("    (none)");
    }
    for migration in migrations {
        println!("    {}", migration.filename);
    }
}

pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
