//! Error types for gv-script

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One compile problem located in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    /// 1-based line, 0 when unknown
    pub line: usize,
    /// 1-based column, 0 when unknown
    pub column: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}

/// All diagnostics produced while compiling one or more migration files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// Merge several compile errors into one.
    pub fn merge(errors: impl IntoIterator<Item = CompileError>) -> Self {
        Self {
            diagnostics: errors.into_iter().flat_map(|e| e.diagnostics).collect(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} compile error(s)", self.diagnostics.len())?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Script compilation and execution errors
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Script failed to compile (G001)
    #[error("[G001] {0}")]
    Compile(#[from] CompileError),

    /// Exception thrown while evaluating or running a script (G002)
    #[error("[G002] {origin}: {message}")]
    Runtime { origin: String, message: String },

    /// Bundle does not export the requested function (G003)
    #[error("[G003] {origin}: migration does not export '{export}'")]
    MissingExport { origin: String, export: String },

    /// Value could not cross the host/script boundary (G004)
    #[error("[G004] {origin}: {message}")]
    Marshal { origin: String, message: String },

    /// `up`/`down` returned a promise (G005)
    #[error("[G005] {origin}: '{export}' returned a promise; asynchronous migrations are not supported")]
    Asynchronous { origin: String, export: String },
}

/// Result type alias for ScriptError
pub type ScriptResult<T> = Result<T, ScriptError>;
