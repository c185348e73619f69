//! Error types for gv-migrate

use gv_db::DriverError;
use gv_script::CompileError;
use std::path::PathBuf;
use thiserror::Error;

/// Resolver and command errors
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Could not connect to or validate the target store (R001)
    #[error("[R001] Connection failed: {0}")]
    Connection(String),

    /// One or more migration files failed to compile (R002)
    #[error("[R002] {0}")]
    Compile(#[from] CompileError),

    /// A migration threw or misbehaved; its step was rolled back (R003)
    #[error("[R003] Migration {filename} failed: {message}")]
    ScriptRuntime { filename: String, message: String },

    /// Target names no migration in the relevant set (R004)
    #[error("[R004] Migration not found: {target}")]
    NotFound { target: String },

    /// Applied set could not be read or written (R005)
    #[error("[R005] Migration metadata persistence failed: {0}")]
    Persistence(String),

    /// Applied migration has no file on disk (R006)
    #[error("[R006] Source for applied migration {filename} not found at {}", path.display())]
    MissingSource { filename: String, path: PathBuf },

    /// Cancelled before the step committed (R007)
    #[error("[R007] Cancelled before {filename} committed")]
    Cancelled { filename: String },

    /// Migrations directory could not be read (R008)
    #[error("[R008] Cannot read migrations directory {}: {source}", path.display())]
    MigrationsDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other driver failure during a step (R009)
    #[error("[R009] Migration {filename} failed: {source}")]
    Step {
        filename: String,
        #[source]
        source: DriverError,
    },
}

/// Result type alias for MigrateError
pub type MigrateResult<T> = Result<T, MigrateError>;

impl MigrateError {
    /// Classify a driver error raised outside of a migration step.
    pub(crate) fn from_driver(err: DriverError) -> Self {
        match err {
            DriverError::Connection(message) => MigrateError::Connection(message),
            DriverError::NotConnected => MigrateError::Connection("driver is not connected".to_string()),
            DriverError::Script(gv_script::ScriptError::Compile(compile)) => {
                MigrateError::Compile(compile)
            }
            other => MigrateError::Persistence(other.to_string()),
        }
    }

    /// Classify a driver error raised while running the step for `filename`.
    pub(crate) fn from_step(filename: &str, err: DriverError) -> Self {
        let filename = filename.to_string();
        match err {
            DriverError::Script(script) => MigrateError::ScriptRuntime {
                filename,
                message: script.to_string(),
            },
            DriverError::Cancelled => MigrateError::Cancelled { filename },
            DriverError::Persistence(message) => MigrateError::Persistence(message),
            DriverError::Connection(message) => MigrateError::Connection(message),
            other => MigrateError::Step {
                filename,
                source: other,
            },
        }
    }
}
