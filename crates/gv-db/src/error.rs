//! Error types for gv-db

use gv_core::HostError;
use gv_script::ScriptError;
use thiserror::Error;

/// Driver errors
#[derive(Error, Debug)]
pub enum DriverError {
    /// Connection or precondition failure (D001)
    #[error("[D001] Database connection failed: {0}")]
    Connection(String),

    /// Applied set could not be read or written (D002)
    #[error("[D002] Migration metadata persistence failed: {0}")]
    Persistence(String),

    /// BEGIN/COMMIT/ROLLBACK failure or misuse (D003)
    #[error("[D003] Transaction failed: {0}")]
    Transaction(String),

    /// Statement or command issued through a handle failed (D004)
    #[error("[D004] Query failed: {0}")]
    Query(String),

    /// Transaction body panicked; the transaction was rolled back (D005)
    #[error("[D005] Panic inside transaction: {0}")]
    Panicked(String),

    /// Work was cancelled before commit (D006)
    #[error("[D006] Cancelled")]
    Cancelled,

    /// Not connected yet, or already disconnected (D007)
    #[error("[D007] Driver is not connected")]
    NotConnected,

    /// Migration script failed inside the transaction
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Result type alias for DriverError
pub type DriverResult<T> = Result<T, DriverError>;

impl From<DriverError> for HostError {
    fn from(err: DriverError) -> Self {
        HostError::new(err.to_string())
    }
}
