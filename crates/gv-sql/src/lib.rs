//! gv-sql - SQL layer for Graviton
//!
//! This crate builds parameterized queries from `sql` template literals,
//! with backend-specific placeholders, and validates them with sqlparser-rs.

pub mod dialect;
pub mod error;
pub mod query;

pub use dialect::{DuckDbDialect, MySqlDialect, PostgresDialect, SqlDialect, SqliteDialect};
pub use error::{SqlError, SqlResult};
pub use query::{build_query, validate, SqlQuery};
