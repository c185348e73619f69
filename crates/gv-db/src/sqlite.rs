//! SQLite driver

use crate::error::{DriverError, DriverResult};
use crate::relational::{
    self, datetime_from_millis, metadata_from_row, unsupported_param, ExecResult, MetadataSql,
    Row, SqlExecutor, SqlQueryRecognizer, SQL_QUERY_PRELUDE,
};
use crate::traits::{Driver, TransactionBody};
use crate::transaction::{SqlStatements, Transactor};
use gv_core::{DatabaseConfig, MigrationMetadata, Value};
use gv_script::{ScriptHost, ValueRecognizer};
use gv_sql::{SqlDialect, SqlQuery, SqliteDialect};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use std::rc::Rc;

/// Column type for `applied_at`: epoch milliseconds.
const TIMESTAMP_TYPE: &str = "BIGINT";

/// SQLite driver over a file or in-memory database
pub struct SqliteDriver {
    location: String,
    metadata: MetadataSql,
    dialect: Rc<SqliteDialect>,
    executor: Option<Rc<SqliteExecutor>>,
    transactor: Transactor,
}

struct SqliteExecutor {
    conn: Connection,
    dialect: SqliteDialect,
}

impl SqliteDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        let dialect = SqliteDialect::new();
        Self {
            location: strip_scheme(&config.connection_url).to_string(),
            metadata: MetadataSql::new(&dialect, config.metadata_table()),
            dialect: Rc::new(dialect),
            executor: None,
            transactor: Transactor::default(),
        }
    }

    fn executor(&self) -> DriverResult<&Rc<SqliteExecutor>> {
        self.executor.as_ref().ok_or(DriverError::NotConnected)
    }
}

/// `sqlite://path`, `sqlite:path` and bare paths all name a file.
fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

fn transaction_control(
    executor: &SqliteExecutor,
) -> SqlStatements<impl Fn(&str) -> Result<(), String> + '_> {
    SqlStatements {
        execute: move |sql: &str| executor.conn.execute_batch(sql).map_err(|e| e.to_string()),
    }
}

impl ScriptHost for SqliteDriver {
    fn handle(&self) -> Value {
        match &self.executor {
            Some(executor) => relational::handle(executor.clone()),
            None => Value::Null,
        }
    }

    fn globals(&self) -> Vec<(String, Value)> {
        relational::globals(self.dialect.clone())
    }

    fn prelude(&self) -> Option<&str> {
        Some(SQL_QUERY_PRELUDE)
    }

    fn recognizers(&self) -> Vec<Rc<dyn ValueRecognizer>> {
        vec![Rc::new(SqlQueryRecognizer)]
    }
}

impl Driver for SqliteDriver {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn connect(&mut self) -> DriverResult<()> {
        if self.executor.is_some() {
            return Ok(());
        }
        let opened = if self.location == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&self.location)
        };
        let conn =
            opened.map_err(|e| DriverError::Connection(format!("{e}: {}", self.location)))?;

        conn.execute_batch(&self.metadata.create(TIMESTAMP_TYPE))
            .map_err(|e| DriverError::Connection(format!("failed to create metadata table: {e}")))?;
        log::debug!("Connected to SQLite database {}", self.location);

        self.executor = Some(Rc::new(SqliteExecutor {
            conn,
            dialect: SqliteDialect::new(),
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        if self.executor.take().is_some() {
            log::debug!("Disconnected from SQLite database {}", self.location);
        }
        Ok(())
    }

    fn applied_migrations(&self) -> DriverResult<Vec<MigrationMetadata>> {
        let executor = self.executor()?;
        let mut stmt = executor
            .conn
            .prepare(&self.metadata.select())
            .map_err(|e| DriverError::Persistence(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| DriverError::Persistence(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Persistence(format!("row error: {e}")))?;

        rows.into_iter()
            .map(|(filename, source, millis)| {
                metadata_from_row(filename, source, datetime_from_millis(millis)?)
            })
            .collect()
    }

    fn set_applied_migrations(&self, migrations: &[MigrationMetadata]) -> DriverResult<()> {
        let executor = self.executor()?;
        let conn = &executor.conn;
        self.transactor
            .join_or_run(&transaction_control(executor), &mut || {
                conn.execute(&self.metadata.delete_all(), [])
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                for migration in migrations {
                    conn.execute(
                        self.metadata.insert(),
                        params![
                            migration.filename.as_str(),
                            migration.source,
                            migration.applied_at.timestamp_millis()
                        ],
                    )
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                }
                Ok(())
            })
    }

    fn with_transaction(&self, body: TransactionBody<'_>) -> DriverResult<()> {
        let executor = self.executor()?;
        self.transactor.run(&transaction_control(executor), body)
    }
}

impl SqlExecutor for SqliteExecutor {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn exec(&self, query: &SqlQuery) -> DriverResult<ExecResult> {
        let params = to_sql_params(&query.params)?;
        let rows_affected = self
            .conn
            .execute(&query.query, params_from_iter(params.iter()))
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;
        Ok(ExecResult {
            rows_affected: rows_affected as u64,
            last_insert_id: Some(self.conn.last_insert_rowid()),
        })
    }

    fn query(&self, query: &SqlQuery) -> DriverResult<Vec<Row>> {
        let params = to_sql_params(&query.params)?;
        let mut stmt = self
            .conn
            .prepare(&query.query)
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..columns.len())
                    .map(|i| row.get_ref(i).map(value_from_sql))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Query(format!("row error: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect())
    }
}

fn to_sql_params(values: &[Value]) -> DriverResult<Vec<SqlValue>> {
    values.iter().map(to_sql_param).collect()
}

fn to_sql_param(value: &Value) -> DriverResult<SqlValue> {
    Ok(match value {
        Value::Undefined | Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Seq(_) | Value::Map(_) => SqlValue::Text(
            value
                .to_json()
                .ok_or_else(|| unsupported_param(value))?
                .to_string(),
        ),
        _ => return Err(unsupported_param(value)),
    })
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Seq(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
    }
}

#[cfg(test)]
#[path = "sqlite_test.rs"]
mod tests;
