//! Error types for gv-core

use thiserror::Error;

/// Core error type for Graviton
#[derive(Error, Debug)]
pub enum CoreError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// C003: Invalid configuration value
    #[error("[C003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// C004: Named database missing from the configuration
    #[error("[C004] Database '{name}' is not configured (available: {available})")]
    DatabaseNotFound { name: String, available: String },

    /// C005: Filename does not follow the migration naming contract
    #[error("[C005] Invalid migration filename '{filename}': expected <YYYYMMDDHHMMSS>-<name>.migration.<ext>")]
    InvalidMigrationFilename { filename: String },

    /// C006: IO error
    #[error("[C006] IO error at {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
