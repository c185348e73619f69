//! Parameterized queries built from `sql` template literals.
//!
//! Interpolated values never touch the query text: each one becomes a
//! placeholder and is carried separately in [`SqlQuery::params`].

use crate::dialect::SqlDialect;
use crate::error::{SqlError, SqlResult};
use gv_core::value::Value;

/// A query string with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub query: String,
    pub params: Vec<Value>,
    /// False when the query did not parse; it still runs.
    pub validated: bool,
}

impl SqlQuery {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
            validated: true,
        }
    }
}

/// Interleave template `parts` with placeholders for `values`.
///
/// A template with N values always has N + 1 parts.
pub fn build_query(
    parts: &[String],
    values: Vec<Value>,
    dialect: &dyn SqlDialect,
) -> SqlResult<SqlQuery> {
    if parts.len() != values.len() + 1 {
        return Err(SqlError::TemplateMismatch {
            parts: parts.len(),
            values: values.len(),
        });
    }

    let mut query = String::new();
    for (i, part) in parts.iter().enumerate() {
        query.push_str(part);
        if i < values.len() {
            query.push_str(&dialect.placeholder(i + 1));
        }
    }

    let validated = validate(dialect, &query);
    Ok(SqlQuery {
        query,
        params: values,
        validated,
    })
}

/// Best-effort syntax check. Failures are logged, never returned.
pub fn validate(dialect: &dyn SqlDialect, query: &str) -> bool {
    let result = if query.trim().is_empty() {
        Err(SqlError::EmptySql)
    } else {
        dialect.parse(query).map(|_| ())
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            log::warn!("SQL validation warning ({} dialect, continuing anyway): {e}", dialect.name());
            false
        }
    }
}

#[cfg(test)]
#[path = "query_test.rs"]
mod tests;
