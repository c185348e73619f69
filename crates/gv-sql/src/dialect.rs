//! SQL dialect abstraction

use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect, DuckDbDialect as SqlParserDuckDb, MySqlDialect as SqlParserMySql,
    PostgreSqlDialect as SqlParserPostgres, SQLiteDialect as SqlParserSqlite,
};
use sqlparser::parser::Parser;

use crate::error::{SqlError, SqlResult};

/// Trait for SQL dialect implementations
pub trait SqlDialect {
    /// Get the underlying sqlparser dialect
    fn parser_dialect(&self) -> &dyn Dialect;

    /// Parse SQL into AST statements
    fn parse(&self, sql: &str) -> SqlResult<Vec<Statement>> {
        Parser::parse_sql(self.parser_dialect(), sql).map_err(|e| {
            let msg = e.to_string();
            // sqlparser reports "... at Line: X, Column: Y"
            let (line, column) = parse_location_from_error(&msg);
            SqlError::ParseError {
                message: msg,
                line,
                column,
            }
        })
    }

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Quote an identifier for this dialect
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Get the dialect name
    fn name(&self) -> &'static str;
}

/// Parse line and column from a sqlparser error message.
///
/// `ParserError` is a plain string wrapper, so the location is read back
/// out of the "Line: N, Column: M" suffix.
fn parse_location_from_error(msg: &str) -> (usize, usize) {
    let number_after = |label: &str| -> Option<usize> {
        let start = msg.find(label)? + label.len();
        let digits: String = msg[start..]
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    };
    match (number_after("Line:"), number_after("Column:")) {
        (Some(line), Some(column)) => (line, column),
        _ => (0, 0),
    }
}

/// PostgreSQL dialect, `$1`-style placeholders
#[derive(Debug)]
pub struct PostgresDialect {
    dialect: SqlParserPostgres,
}

impl PostgresDialect {
    pub fn new() -> Self {
        Self {
            dialect: SqlParserPostgres {},
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for PostgresDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn name(&self) -> &'static str {
        "postgresql"
    }
}

/// SQLite dialect, `?` placeholders
#[derive(Debug)]
pub struct SqliteDialect {
    dialect: SqlParserSqlite,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            dialect: SqlParserSqlite {},
        }
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for SqliteDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// DuckDB dialect, `?` placeholders
#[derive(Debug)]
pub struct DuckDbDialect {
    dialect: SqlParserDuckDb,
}

impl DuckDbDialect {
    pub fn new() -> Self {
        Self {
            dialect: SqlParserDuckDb {},
        }
    }
}

impl Default for DuckDbDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for DuckDbDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn name(&self) -> &'static str {
        "duckdb"
    }
}

/// MySQL dialect, `?` placeholders and backtick-quoted identifiers
#[derive(Debug)]
pub struct MySqlDialect {
    dialect: SqlParserMySql,
}

impl MySqlDialect {
    pub fn new() -> Self {
        Self {
            dialect: SqlParserMySql {},
        }
    }
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlDialect for MySqlDialect {
    fn parser_dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}

#[cfg(test)]
#[path = "dialect_test.rs"]
mod tests;
