//! Pending and applied migration sets.

use crate::error::{MigrateError, MigrateResult};
use crate::migration::Migration;
use gv_core::MigrationFilename;
use gv_db::Driver;
use gv_script::{CompileError, Script};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Files in `dir` that follow the migration naming contract with one of
/// `extensions`, sorted by filename. Anything else is skipped.
pub fn migration_files(
    dir: &Path,
    extensions: &[String],
) -> MigrateResult<Vec<(MigrationFilename, PathBuf)>> {
    let read_err = |source| MigrateError::MigrationsDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if !path.is_file() {
            log::debug!("Skipping {}: not a regular file", path.display());
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            log::debug!("Skipping {}: file name is not UTF-8", path.display());
            continue;
        };
        let Some(filename) = MigrationFilename::try_new(name) else {
            log::debug!("Skipping {name}: not a migration filename");
            continue;
        };
        if !extensions.iter().any(|ext| ext == filename.extension()) {
            log::debug!("Skipping {name}: extension is not configured");
            continue;
        }
        files.push((filename, path));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Migrations on disk that are not in the applied set, compiled and sorted
/// by filename. Compile diagnostics of every file are reported together.
/// No migration code runs.
pub fn pending(driver: &dyn Driver, dir: &Path, extensions: &[String]) -> MigrateResult<Vec<Migration>> {
    let applied: HashSet<MigrationFilename> = driver
        .applied_migrations()
        .map_err(MigrateError::from_driver)?
        .into_iter()
        .map(|metadata| metadata.filename)
        .collect();

    let mut migrations = Vec::new();
    let mut errors = Vec::new();
    for (filename, path) in migration_files(dir, extensions)? {
        if applied.contains(&filename) {
            continue;
        }
        match Script::compile(&path) {
            Ok(script) => migrations.push(Migration::pending(filename, script)),
            Err(err) => errors.push(err),
        }
    }
    if !errors.is_empty() {
        return Err(CompileError::merge(errors).into());
    }
    Ok(migrations)
}

/// The applied set as migrations whose scripts come from the persisted
/// source, sorted by filename.
pub fn applied(driver: &dyn Driver) -> MigrateResult<Vec<Migration>> {
    let mut migrations: Vec<Migration> = driver
        .applied_migrations()
        .map_err(MigrateError::from_driver)?
        .into_iter()
        .map(Migration::applied)
        .collect();
    migrations.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(migrations)
}

/// Like [`applied`], but every script is recompiled from its file in `dir`.
pub fn applied_with_source_from_disk(
    driver: &dyn Driver,
    dir: &Path,
) -> MigrateResult<Vec<Migration>> {
    let mut migrations = Vec::new();
    let mut errors = Vec::new();
    for migration in applied(driver)? {
        let path = dir.join(migration.filename.as_str());
        if !path.is_file() {
            return Err(MigrateError::MissingSource {
                filename: migration.filename.into_inner(),
                path,
            });
        }
        match Script::compile(&path) {
            Ok(script) => migrations.push(Migration { script, ..migration }),
            Err(err) => errors.push(err),
        }
    }
    if !errors.is_empty() {
        return Err(CompileError::merge(errors).into());
    }
    Ok(migrations)
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
