//! Commands over one connected driver: plan, status, set-head and execute.

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;
use crate::plan::{self, Direction, Plan};
use crate::resolver;
use gv_core::metadata::{now_millis, sort_by_filename};
use gv_core::{DatabaseConfig, MigrationMetadata};
use gv_db::{Driver, DriverError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Applied and pending migrations of one store.
#[derive(Debug, Clone)]
pub struct Status {
    pub applied: Vec<Migration>,
    pub pending: Vec<Migration>,
}

/// Runs resolver queries and plans against one connected driver.
pub struct Migrator<'a> {
    driver: &'a dyn Driver,
    dir: PathBuf,
    extensions: Vec<String>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Migrator<'a> {
    pub fn new(driver: &'a dyn Driver, dir: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            driver,
            dir: dir.into(),
            extensions,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Migrator for a configured store whose config file lives in `root`.
    pub fn for_config(driver: &'a dyn Driver, config: &DatabaseConfig, root: &Path) -> Self {
        Self::new(
            driver,
            config.migrations_dir(root),
            config.script_extensions.clone(),
        )
    }

    /// Share a cancellation flag. Once set, [`execute`](Self::execute) stops
    /// before the next step or rolls back the current one before it commits.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.dir
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// The filename is authoritative; a different exported `name` is only
    /// reported.
    fn check_declared_name(&self, migration: &Migration) -> MigrateResult<()> {
        let declared = migration
            .script
            .declared_name(self.driver)
            .map_err(|e| MigrateError::ScriptRuntime {
                filename: migration.filename.to_string(),
                message: e.to_string(),
            })?;
        if let Some(declared) = declared {
            if declared != migration.name() {
                log::warn!(
                    "Migration {} exports name '{declared}' but its filename names it '{}'",
                    migration.filename,
                    migration.name()
                );
            }
        }
        Ok(())
    }

    pub fn pending(&self) -> MigrateResult<Vec<Migration>> {
        resolver::pending(self.driver, &self.dir, &self.extensions)
    }

    /// Pending migrations through `target`, or all pending.
    pub fn plan_up(&self, target: Option<&str>) -> MigrateResult<Plan> {
        Ok(Plan {
            direction: Direction::Up,
            migrations: plan::select_up(self.pending()?, target)?,
        })
    }

    /// Applied migrations to roll back, most recent first. With `from_disk`
    /// the `down` functions come from the files in the migrations directory
    /// instead of the persisted source.
    pub fn plan_down(&self, target: Option<&str>, from_disk: bool) -> MigrateResult<Plan> {
        let applied = if from_disk {
            resolver::applied_with_source_from_disk(self.driver, &self.dir)?
        } else {
            resolver::applied(self.driver)?
        };
        Ok(Plan {
            direction: Direction::Down,
            migrations: plan::select_down(applied, target)?,
        })
    }

    pub fn status(&self) -> MigrateResult<Status> {
        Ok(Status {
            applied: resolver::applied(self.driver)?,
            pending: self.pending()?,
        })
    }

    /// Mark every migration through `target` as applied, and nothing after
    /// it, without running any script. Returns the new applied set.
    pub fn set_head(&self, target: &str) -> MigrateResult<Vec<Migration>> {
        let head = if target == plan::ALL {
            Vec::new()
        } else {
            plan::select_head(resolver::applied(self.driver)?, self.pending()?, target)?
        };
        let now = now_millis();
        let records: Vec<MigrationMetadata> = head.iter().map(|m| m.to_metadata(now)).collect();
        self.driver
            .set_applied_migrations(&records)
            .map_err(MigrateError::from_driver)?;
        log::info!("Applied set now ends at {}", head.last().map_or(plan::ALL, |m| m.filename.as_str()));
        Ok(head)
    }

    /// Run `plan` one migration per transaction. Each step's script and its
    /// applied-set update commit together; earlier steps stay committed when
    /// a later one fails. `on_step` is called after each commit.
    pub fn execute(&self, plan: &Plan, mut on_step: impl FnMut(&Migration)) -> MigrateResult<usize> {
        let mut applied = self
            .driver
            .applied_migrations()
            .map_err(MigrateError::from_driver)?;

        for migration in &plan.migrations {
            let filename = migration.filename.as_str();
            if self.cancelled() {
                return Err(MigrateError::Cancelled {
                    filename: filename.to_string(),
                });
            }

            let next = match plan.direction {
                Direction::Up => {
                    let mut next = applied.clone();
                    next.push(migration.to_metadata(now_millis()));
                    sort_by_filename(&mut next);
                    next
                }
                Direction::Down => applied
                    .iter()
                    .filter(|record| record.filename != migration.filename)
                    .cloned()
                    .collect(),
            };

            if plan.direction == Direction::Up {
                self.check_declared_name(migration)?;
            }

            log::debug!("Running {} for {filename}", plan.direction);
            self.driver
                .with_transaction(&mut || {
                    match plan.direction {
                        Direction::Up => migration.script.up(self.driver)?,
                        Direction::Down => migration.script.down(self.driver)?,
                    }
                    if self.cancelled() {
                        return Err(DriverError::Cancelled);
                    }
                    self.driver.set_applied_migrations(&next)
                })
                .map_err(|e| MigrateError::from_step(filename, e))?;

            log::info!("Migrated {} {filename}", plan.direction);
            applied = next;
            on_step(migration);
        }
        Ok(plan.len())
    }
}

#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;
