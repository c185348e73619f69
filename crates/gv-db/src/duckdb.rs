//! DuckDB driver

use crate::error::{DriverError, DriverResult};
use crate::relational::{
    self, datetime_from_millis, metadata_from_row, unsupported_param, ExecResult, MetadataSql,
    Row, SqlExecutor, SqlQueryRecognizer, SQL_QUERY_PRELUDE,
};
use crate::traits::{Driver, TransactionBody};
use crate::transaction::{SqlStatements, Transactor};
use chrono::{DateTime, SecondsFormat};
use duckdb::types::{TimeUnit, Value as DuckValue, ValueRef};
use duckdb::{params, params_from_iter, Connection};
use gv_core::{DatabaseConfig, MigrationMetadata, Value};
use gv_script::{ScriptHost, ValueRecognizer};
use gv_sql::{DuckDbDialect, SqlDialect, SqlQuery};
use std::rc::Rc;

/// Column type for `applied_at`: epoch milliseconds.
const TIMESTAMP_TYPE: &str = "BIGINT";

/// DuckDB driver over a file or in-memory database
pub struct DuckDbDriver {
    location: String,
    metadata: MetadataSql,
    dialect: Rc<DuckDbDialect>,
    executor: Option<Rc<DuckDbExecutor>>,
    transactor: Transactor,
}

struct DuckDbExecutor {
    conn: Connection,
    dialect: DuckDbDialect,
}

impl DuckDbDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        let dialect = DuckDbDialect::new();
        Self {
            location: strip_scheme(&config.connection_url).to_string(),
            metadata: MetadataSql::new(&dialect, config.metadata_table()),
            dialect: Rc::new(dialect),
            executor: None,
            transactor: Transactor::default(),
        }
    }

    fn executor(&self) -> DriverResult<&Rc<DuckDbExecutor>> {
        self.executor.as_ref().ok_or(DriverError::NotConnected)
    }
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("duckdb://")
        .or_else(|| url.strip_prefix("duckdb:"))
        .unwrap_or(url)
}

fn transaction_control(
    executor: &DuckDbExecutor,
) -> SqlStatements<impl Fn(&str) -> Result<(), String> + '_> {
    SqlStatements {
        execute: move |sql: &str| executor.conn.execute_batch(sql).map_err(|e| e.to_string()),
    }
}

impl ScriptHost for DuckDbDriver {
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

impl Driver for DuckDbDriver {
    fn kind(&self) -> &'static str {
        "duckdb"
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
        log::debug!("Connected to DuckDB database {}", self.location);

        self.executor = Some(Rc::new(DuckDbExecutor {
            conn,
            dialect: DuckDbDialect::new(),
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        if self.executor.take().is_some() {
            log::debug!("Disconnected from DuckDB database {}", self.location);
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

impl SqlExecutor for DuckDbExecutor {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn exec(&self, query: &SqlQuery) -> DriverResult<ExecResult> {
        let params = to_duckdb_params(&query.params)?;
        let rows_affected = self
            .conn
            .execute(&query.query, params_from_iter(params.iter()))
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;
        Ok(ExecResult {
            rows_affected: rows_affected as u64,
            last_insert_id: None,
        })
    }

    fn query(&self, query: &SqlQuery) -> DriverResult<Vec<Row>> {
        let params = to_duckdb_params(&query.params)?;
        let mut stmt = self
            .conn
            .prepare(&query.query)
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;

        // column_count() panics before the statement has run, so rows are
        // collected first and the column names read afterwards.
        let raw_rows: Vec<Vec<Value>> = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let column_count = row.as_ref().column_count();
                (0..column_count)
                    .map(|i| column_value(row, i))
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Query(format!("row error: {e}")))?;

        let columns: Vec<String> = (0..stmt.column_count())
            .map(|i| stmt.column_name(i).map_or("?".to_string(), |name| name.to_string()))
            .collect();

        Ok(raw_rows
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect())
            .collect())
    }
}

fn to_duckdb_params(values: &[Value]) -> DriverResult<Vec<DuckValue>> {
    values.iter().map(to_duckdb_param).collect()
}

fn to_duckdb_param(value: &Value) -> DriverResult<DuckValue> {
    Ok(match value {
        Value::Undefined | Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Int(n) => DuckValue::BigInt(*n),
        Value::Float(f) => DuckValue::Double(*f),
        Value::String(s) => DuckValue::Text(s.clone()),
        Value::Seq(_) | Value::Map(_) => DuckValue::Text(
            value
                .to_json()
                .ok_or_else(|| unsupported_param(value))?
                .to_string(),
        ),
        _ => return Err(unsupported_param(value)),
    })
}

fn column_value(row: &duckdb::Row<'_>, idx: usize) -> duckdb::Result<Value> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(n) => Value::Int(i64::from(n)),
        ValueRef::SmallInt(n) => Value::Int(i64::from(n)),
        ValueRef::Int(n) => Value::Int(i64::from(n)),
        ValueRef::BigInt(n) => Value::Int(n),
        ValueRef::HugeInt(n) => i64::try_from(n).map_or(Value::Float(n as f64), Value::Int),
        ValueRef::UTinyInt(n) => Value::Int(i64::from(n)),
        ValueRef::USmallInt(n) => Value::Int(i64::from(n)),
        ValueRef::UInt(n) => Value::Int(i64::from(n)),
        ValueRef::UBigInt(n) => Value::from(n),
        ValueRef::Float(f) => Value::Float(f64::from(f)),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::Seq(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect())
        }
        ValueRef::Timestamp(unit, raw) => timestamp_value(unit, raw),
        // Remaining types (decimals, dates, nested values) go through
        // DuckDB's own text conversion.
        _ => row
            .get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::String),
    };
    Ok(value)
}

fn timestamp_value(unit: TimeUnit, raw: i64) -> Value {
    let micros = match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    };
    DateTime::from_timestamp_micros(micros).map_or(Value::Null, |ts| {
        Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    })
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
