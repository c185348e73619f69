//! MySQL driver

use crate::error::{DriverError, DriverResult};
use crate::relational::{
    self, metadata_from_row, unsupported_param, ExecResult, MetadataSql, Row, SqlExecutor,
    SqlQueryRecognizer, SQL_QUERY_PRELUDE,
};
use crate::traits::{Driver, TransactionBody};
use crate::transaction::{TransactionControl, Transactor};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use gv_core::{DatabaseConfig, MigrationMetadata, Value};
use gv_script::{ScriptHost, ValueRecognizer};
use gv_sql::{MySqlDialect, SqlDialect, SqlQuery};
use mysql::consts::ColumnType;
use mysql::prelude::Queryable;
use mysql::{Conn, Params};
use std::cell::RefCell;
use std::rc::Rc;

const KEY_TYPE: &str = "VARCHAR(255)";
const SOURCE_TYPE: &str = "LONGTEXT";
const TIMESTAMP_TYPE: &str = "DATETIME(3)";

/// Character set id MySQL reports for binary columns.
const BINARY_CHARSET: u16 = 63;

/// MySQL driver over a single blocking connection
pub struct MySqlDriver {
    url: String,
    database: Option<String>,
    metadata: MetadataSql,
    dialect: Rc<MySqlDialect>,
    executor: Option<Rc<MySqlExecutor>>,
    transactor: Transactor,
}

struct MySqlExecutor {
    conn: RefCell<Conn>,
    dialect: MySqlDialect,
}

impl MySqlDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        let dialect = MySqlDialect::new();
        Self {
            url: normalize_url(&config.connection_url),
            database: config.database_name.clone(),
            metadata: MetadataSql::new(&dialect, config.metadata_table()),
            dialect: Rc::new(dialect),
            executor: None,
            transactor: Transactor::default(),
        }
    }

    fn executor(&self) -> DriverResult<&Rc<MySqlExecutor>> {
        self.executor.as_ref().ok_or(DriverError::NotConnected)
    }
}

/// Accept both `mysql://user@host:port/db` URLs and the
/// `user@tcp(host:port)/db?opts` DSN form. DSN options are dropped.
pub(crate) fn normalize_url(url: &str) -> String {
    if url.contains("://") {
        return url.to_string();
    }
    let Some(tcp) = url.find("tcp(") else {
        return url.to_string();
    };
    let Some(close) = url[tcp..].find(')').map(|i| tcp + i) else {
        return url.to_string();
    };
    let userinfo = &url[..tcp];
    let address = &url[tcp + 4..close];
    let path = url[close + 1..].split('?').next().unwrap_or("");
    format!("mysql://{userinfo}{address}{path}")
}

/// MySQL rejects `BEGIN TRANSACTION`, so this does not go through
/// `SqlStatements`.
struct MySqlTransaction<'a>(&'a MySqlExecutor);

impl MySqlTransaction<'_> {
    fn run(&self, sql: &str) -> DriverResult<()> {
        self.0
            .conn
            .borrow_mut()
            .query_drop(sql)
            .map_err(|e| DriverError::Transaction(format!("{sql} failed: {e}")))
    }
}

impl TransactionControl for MySqlTransaction<'_> {
    fn begin(&self) -> DriverResult<()> {
        self.run("START TRANSACTION")
    }

    fn commit(&self) -> DriverResult<()> {
        self.run("COMMIT")
    }

    fn rollback(&self) -> DriverResult<()> {
        self.run("ROLLBACK")
    }
}

impl ScriptHost for MySqlDriver {
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

impl Driver for MySqlDriver {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    fn connect(&mut self) -> DriverResult<()> {
        if self.executor.is_some() {
            return Ok(());
        }
        let connection = |e: mysql::Error| DriverError::Connection(e.to_string());
        let mut conn = Conn::new(self.url.as_str()).map_err(connection)?;
        if let Some(database) = &self.database {
            conn.query_drop(format!("USE {}", self.dialect.quote_ident(database)))
                .map_err(connection)?;
        }
        conn.query_drop(
            self.metadata
                .create_with(KEY_TYPE, SOURCE_TYPE, TIMESTAMP_TYPE),
        )
        .map_err(|e| DriverError::Connection(format!("failed to create metadata table: {e}")))?;
        log::debug!("Connected to MySQL");

        self.executor = Some(Rc::new(MySqlExecutor {
            conn: RefCell::new(conn),
            dialect: MySqlDialect::new(),
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        // Scripts may still hold a handle; the connection closes with the last one.
        if self.executor.take().is_some() {
            log::debug!("Disconnected from MySQL");
        }
        Ok(())
    }

    fn applied_migrations(&self) -> DriverResult<Vec<MigrationMetadata>> {
        let executor = self.executor()?;
        let rows: Vec<mysql::Row> = executor
            .conn
            .borrow_mut()
            .exec(self.metadata.select(), Params::Empty)
            .map_err(|e| DriverError::Persistence(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let text = |idx: usize| match row.as_ref(idx) {
                    Some(mysql::Value::Bytes(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
                    other => Err(DriverError::Persistence(format!(
                        "metadata column {idx} is not text: {other:?}"
                    ))),
                };
                let applied_at = row
                    .as_ref(2)
                    .ok_or_else(|| DriverError::Persistence("missing applied_at".to_string()))
                    .and_then(datetime_from_value)?;
                metadata_from_row(text(0)?, text(1)?, applied_at)
            })
            .collect()
    }

    fn set_applied_migrations(&self, migrations: &[MigrationMetadata]) -> DriverResult<()> {
        let executor = self.executor()?;
        self.transactor
            .join_or_run(&MySqlTransaction(executor), &mut || {
                let mut conn = executor.conn.borrow_mut();
                conn.query_drop(self.metadata.delete_all())
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                for migration in migrations {
                    conn.exec_drop(
                        self.metadata.insert(),
                        Params::Positional(vec![
                            mysql::Value::Bytes(migration.filename.as_str().as_bytes().to_vec()),
                            mysql::Value::Bytes(migration.source.as_bytes().to_vec()),
                            datetime_to_value(&migration.applied_at.naive_utc()),
                        ]),
                    )
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                }
                Ok(())
            })
    }

    fn with_transaction(&self, body: TransactionBody<'_>) -> DriverResult<()> {
        let executor = self.executor()?;
        self.transactor.run(&MySqlTransaction(executor), body)
    }
}

impl MySqlExecutor {
    fn query_err(query: &SqlQuery) -> impl Fn(mysql::Error) -> DriverError + '_ {
        move |e| DriverError::Query(format!("{e}: {}", query.query))
    }
}

/// Parameterless statements go over the text protocol so that statements
/// MySQL cannot prepare still run.
impl SqlExecutor for MySqlExecutor {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn exec(&self, query: &SqlQuery) -> DriverResult<ExecResult> {
        let mut conn = self.conn.borrow_mut();
        if query.params.is_empty() {
            conn.query_drop(&query.query).map_err(Self::query_err(query))?;
        } else {
            conn.exec_drop(&query.query, to_params(&query.params)?)
                .map_err(Self::query_err(query))?;
        }
        let last_insert_id = match conn.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok(),
        };
        Ok(ExecResult {
            rows_affected: conn.affected_rows(),
            last_insert_id,
        })
    }

    fn query(&self, query: &SqlQuery) -> DriverResult<Vec<Row>> {
        let rows: Vec<mysql::Row> = {
            let mut conn = self.conn.borrow_mut();
            if query.params.is_empty() {
                conn.query(&query.query).map_err(Self::query_err(query))?
            } else {
                conn.exec(&query.query, to_params(&query.params)?)
                    .map_err(Self::query_err(query))?
            }
        };

        rows.iter()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let raw = row.as_ref(idx).unwrap_or(&mysql::Value::NULL);
                        let value = column_value(
                            raw,
                            column.column_type(),
                            column.character_set() == BINARY_CHARSET,
                        )
                        .map_err(|e| {
                            DriverError::Query(format!("column {}: {e}", column.name_str()))
                        })?;
                        Ok((column.name_str().into_owned(), value))
                    })
                    .collect()
            })
            .collect()
    }
}

fn to_params(values: &[Value]) -> DriverResult<Params> {
    let values = values.iter().map(to_mysql_value).collect::<DriverResult<Vec<_>>>()?;
    Ok(Params::Positional(values))
}

/// Bind a value as a positional parameter. MySQL converts the text and
/// numeric forms to the column type itself.
fn to_mysql_value(value: &Value) -> DriverResult<mysql::Value> {
    Ok(match value {
        Value::Undefined | Value::Null => mysql::Value::NULL,
        Value::Bool(b) => mysql::Value::Int(i64::from(*b)),
        Value::Int(n) => mysql::Value::Int(*n),
        Value::Float(f) => mysql::Value::Double(*f),
        Value::String(s) => mysql::Value::Bytes(s.clone().into_bytes()),
        Value::Seq(_) | Value::Map(_) => {
            let json = value.to_json().ok_or_else(|| unsupported_param(value))?;
            mysql::Value::Bytes(json.to_string().into_bytes())
        }
        _ => return Err(unsupported_param(value)),
    })
}

fn datetime_to_value(ts: &NaiveDateTime) -> mysql::Value {
    mysql::Value::Date(
        u16::try_from(ts.year()).unwrap_or(0),
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        ts.nanosecond() / 1_000,
    )
}

fn naive_datetime(value: &mysql::Value) -> Option<NaiveDateTime> {
    match value {
        mysql::Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))?
                .and_hms_micro_opt(
                    u32::from(*hour),
                    u32::from(*minute),
                    u32::from(*second),
                    *micros,
                )
        }
        mysql::Value::Bytes(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?;
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok()
        }
        _ => None,
    }
}

/// `applied_at` is stored as a UTC `DATETIME(3)`.
fn datetime_from_value(value: &mysql::Value) -> DriverResult<DateTime<Utc>> {
    naive_datetime(value)
        .map(|ts| ts.and_utc())
        .ok_or_else(|| DriverError::Persistence(format!("invalid applied_at: {value:?}")))
}

/// Convert a result cell. Text-protocol rows carry every value as bytes,
/// so the column type decides how they are read.
fn column_value(value: &mysql::Value, ty: ColumnType, binary: bool) -> Result<Value, String> {
    use ColumnType::*;
    Ok(match value {
        mysql::Value::NULL => Value::Null,
        mysql::Value::Int(n) => Value::Int(*n),
        mysql::Value::UInt(n) => match i64::try_from(*n) {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Float(*n as f64),
        },
        mysql::Value::Float(f) => Value::Float(f64::from(*f)),
        mysql::Value::Double(f) => Value::Float(*f),
        mysql::Value::Date(..) => {
            let ts = naive_datetime(value).ok_or_else(|| format!("invalid date {value:?}"))?;
            if matches!(ty, MYSQL_TYPE_DATE | MYSQL_TYPE_NEWDATE) {
                Value::String(ts.date().to_string())
            } else {
                Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            }
        }
        mysql::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let hours = days * 24 + u32::from(*hours);
            let sign = if *negative { "-" } else { "" };
            let mut text = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if *micros > 0 {
                text.push_str(&format!(".{micros:06}"));
            }
            Value::String(text)
        }
        mysql::Value::Bytes(bytes) => {
            let text = || String::from_utf8_lossy(bytes).into_owned();
            match ty {
                MYSQL_TYPE_TINY | MYSQL_TYPE_SHORT | MYSQL_TYPE_LONG | MYSQL_TYPE_INT24
                | MYSQL_TYPE_LONGLONG | MYSQL_TYPE_YEAR => {
                    let text = text();
                    match text.parse::<i64>() {
                        Ok(n) => Value::Int(n),
                        Err(_) => text
                            .parse::<f64>()
                            .map(Value::Float)
                            .map_err(|e| format!("invalid integer '{text}': {e}"))?,
                    }
                }
                MYSQL_TYPE_FLOAT | MYSQL_TYPE_DOUBLE => {
                    let text = text();
                    Value::Float(
                        text.parse::<f64>()
                            .map_err(|e| format!("invalid number '{text}': {e}"))?,
                    )
                }
                MYSQL_TYPE_DATETIME | MYSQL_TYPE_DATETIME2 | MYSQL_TYPE_TIMESTAMP
                | MYSQL_TYPE_TIMESTAMP2 => match naive_datetime(value) {
                    Some(ts) => Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()),
                    None => Value::String(text()),
                },
                MYSQL_TYPE_JSON => {
                    let text = text();
                    serde_json::from_str::<serde_json::Value>(&text)
                        .map(Value::from)
                        .unwrap_or(Value::String(text))
                }
                MYSQL_TYPE_BIT | MYSQL_TYPE_GEOMETRY => {
                    return Err(format!(
                        "unsupported column type {ty:?}; cast it in the query"
                    ))
                }
                _ if binary && is_blob(ty) => {
                    Value::Seq(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect())
                }
                // DECIMAL stays text to keep its precision.
                _ => Value::String(text()),
            }
        }
    })
}

fn is_blob(ty: ColumnType) -> bool {
    use ColumnType::*;
    matches!(
        ty,
        MYSQL_TYPE_TINY_BLOB
            | MYSQL_TYPE_MEDIUM_BLOB
            | MYSQL_TYPE_LONG_BLOB
            | MYSQL_TYPE_BLOB
            | MYSQL_TYPE_VAR_STRING
            | MYSQL_TYPE_STRING
            | MYSQL_TYPE_VARCHAR
    )
}

#[cfg(test)]
#[path = "mysql_test.rs"]
mod tests;
