//! Error types for gv-sql

use thiserror::Error;

/// SQL parsing and query building errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (S001)
    #[error("[S001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Empty SQL (S002)
    #[error("[S002] SQL is empty")]
    EmptySql,

    /// Template fragments and values do not interleave (S003)
    #[error("[S003] Template has {parts} fragment(s) for {values} value(s)")]
    TemplateMismatch { parts: usize, values: usize },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
