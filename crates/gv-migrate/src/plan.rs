//! Target selection for `up`, `down` and `set-head`.

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;
use std::fmt;

/// Target meaning "everything" for `down` and "nothing" for `set-head`.
pub const ALL: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// Ordered migrations selected for one batch.
#[derive(Debug, Clone)]
pub struct Plan {
    pub direction: Direction,
    pub migrations: Vec<Migration>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }
}

fn position(migrations: &[Migration], target: &str) -> MigrateResult<usize> {
    migrations
        .iter()
        .position(|m| m.filename.matches_target(target))
        .ok_or_else(|| MigrateError::NotFound {
            target: target.to_string(),
        })
}

/// Pending migrations through `target`, or all of them.
pub fn select_up(mut pending: Vec<Migration>, target: Option<&str>) -> MigrateResult<Vec<Migration>> {
    if let Some(target) = target {
        let end = position(&pending, target)?;
        pending.truncate(end + 1);
    }
    Ok(pending)
}

/// Applied migrations, most recent first, through `target`. [`ALL`] selects
/// every applied migration and no target only the most recent one.
pub fn select_down(applied: Vec<Migration>, target: Option<&str>) -> MigrateResult<Vec<Migration>> {
    let mut selected: Vec<Migration> = applied.into_iter().rev().collect();
    match target {
        None => selected.truncate(1),
        Some(ALL) => {}
        Some(target) => {
            let end = position(&selected, target)?;
            selected.truncate(end + 1);
        }
    }
    Ok(selected)
}

/// Prefix of the ordered union of applied and pending migrations ending at
/// `target`; empty for [`ALL`].
pub fn select_head(
    applied: Vec<Migration>,
    pending: Vec<Migration>,
    target: &str,
) -> MigrateResult<Vec<Migration>> {
    if target == ALL {
        return Ok(Vec::new());
    }
    let mut all: Vec<Migration> = applied.into_iter().chain(pending).collect();
    all.sort_by(|a, b| a.filename.cmp(&b.filename));
    let end = position(&all, target)?;
    all.truncate(end + 1);
    Ok(all)
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
