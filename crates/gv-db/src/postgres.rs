//! PostgreSQL driver

use crate::error::{DriverError, DriverResult};
use crate::relational::{
    self, metadata_from_row, unsupported_param, ExecResult, MetadataSql, Row, SqlExecutor,
    SqlQueryRecognizer, SQL_QUERY_PRELUDE,
};
use crate::traits::{Driver, TransactionBody};
use crate::transaction::{SqlStatements, Transactor};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use gv_core::{DatabaseConfig, MigrationMetadata, Value};
use gv_script::{ScriptHost, ValueRecognizer};
use gv_sql::{PostgresDialect, SqlDialect, SqlQuery};
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};
use std::cell::RefCell;
use std::rc::Rc;

const TIMESTAMP_TYPE: &str = "TIMESTAMPTZ";

type Param = Box<dyn ToSql + Sync>;

/// PostgreSQL driver over a single blocking client
pub struct PostgresDriver {
    url: String,
    metadata: MetadataSql,
    dialect: Rc<PostgresDialect>,
    executor: Option<Rc<PostgresExecutor>>,
    transactor: Transactor,
}

struct PostgresExecutor {
    client: RefCell<Client>,
    dialect: PostgresDialect,
}

impl PostgresDriver {
    pub fn new(config: &DatabaseConfig) -> Self {
        let dialect = PostgresDialect::new();
        Self {
            url: config.connection_url.clone(),
            metadata: MetadataSql::new(&dialect, config.metadata_table()),
            dialect: Rc::new(dialect),
            executor: None,
            transactor: Transactor::default(),
        }
    }

    fn executor(&self) -> DriverResult<&Rc<PostgresExecutor>> {
        self.executor.as_ref().ok_or(DriverError::NotConnected)
    }
}

fn transaction_control(
    executor: &PostgresExecutor,
) -> SqlStatements<impl Fn(&str) -> Result<(), String> + '_> {
    SqlStatements {
        execute: move |sql: &str| {
            executor
                .client
                .borrow_mut()
                .batch_execute(sql)
                .map_err(|e| e.to_string())
        },
    }
}

impl ScriptHost for PostgresDriver {
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

impl Driver for PostgresDriver {
    fn kind(&self) -> &'static str {
        "postgresql"
    }

    fn connect(&mut self) -> DriverResult<()> {
        if self.executor.is_some() {
            return Ok(());
        }
        let mut client =
            Client::connect(&self.url, NoTls).map_err(|e| DriverError::Connection(e.to_string()))?;
        client
            .batch_execute(&self.metadata.create(TIMESTAMP_TYPE))
            .map_err(|e| DriverError::Connection(format!("failed to create metadata table: {e}")))?;
        log::debug!("Connected to PostgreSQL");

        self.executor = Some(Rc::new(PostgresExecutor {
            client: RefCell::new(client),
            dialect: PostgresDialect::new(),
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> DriverResult<()> {
        if let Some(executor) = self.executor.take() {
            // Scripts may still hold a handle; the client closes with the last one.
            if let Ok(executor) = Rc::try_unwrap(executor) {
                executor
                    .client
                    .into_inner()
                    .close()
                    .map_err(|e| DriverError::Connection(e.to_string()))?;
            }
            log::debug!("Disconnected from PostgreSQL");
        }
        Ok(())
    }

    fn applied_migrations(&self) -> DriverResult<Vec<MigrationMetadata>> {
        let executor = self.executor()?;
        let rows = executor
            .client
            .borrow_mut()
            .query(self.metadata.select().as_str(), &[])
            .map_err(|e| DriverError::Persistence(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let filename: String = row
                    .try_get(0)
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                let source: String = row
                    .try_get(1)
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                let applied_at: DateTime<Utc> = row
                    .try_get(2)
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                metadata_from_row(filename, source, applied_at)
            })
            .collect()
    }

    fn set_applied_migrations(&self, migrations: &[MigrationMetadata]) -> DriverResult<()> {
        let executor = self.executor()?;
        self.transactor
            .join_or_run(&transaction_control(executor), &mut || {
                let mut client = executor.client.borrow_mut();
                client
                    .execute(self.metadata.delete_all().as_str(), &[])
                    .map_err(|e| DriverError::Persistence(e.to_string()))?;
                for migration in migrations {
                    client
                        .execute(
                            self.metadata.insert(),
                            &[
                                &migration.filename.as_str(),
                                &migration.source,
                                &migration.applied_at,
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

impl PostgresExecutor {
    /// Prepare `query` and bind its parameters to the types the server
    /// inferred for them.
    fn prepare(&self, query: &SqlQuery) -> DriverResult<(postgres::Statement, Vec<Param>)> {
        let stmt = self
            .client
            .borrow_mut()
            .prepare(&query.query)
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;
        if stmt.params().len() != query.params.len() {
            return Err(DriverError::Query(format!(
                "query expects {} parameters, got {}",
                stmt.params().len(),
                query.params.len()
            )));
        }
        let params = query
            .params
            .iter()
            .zip(stmt.params())
            .map(|(value, ty)| to_pg_param(value, ty))
            .collect::<DriverResult<Vec<_>>>()?;
        Ok((stmt, params))
    }
}

fn param_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref()).collect()
}

impl SqlExecutor for PostgresExecutor {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn exec(&self, query: &SqlQuery) -> DriverResult<ExecResult> {
        let (stmt, params) = self.prepare(query)?;
        let rows_affected = self
            .client
            .borrow_mut()
            .execute(&stmt, &param_refs(&params))
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;
        Ok(ExecResult {
            rows_affected,
            last_insert_id: None,
        })
    }

    fn query(&self, query: &SqlQuery) -> DriverResult<Vec<Row>> {
        let (stmt, params) = self.prepare(query)?;
        let rows = self
            .client
            .borrow_mut()
            .query(&stmt, &param_refs(&params))
            .map_err(|e| DriverError::Query(format!("{e}: {}", query.query)))?;

        rows.iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let value = column_value(row, idx, column.type_())?;
                        Ok((column.name().to_string(), value))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Bind a value to a parameter of type `ty`.
fn to_pg_param(value: &Value, ty: &Type) -> DriverResult<Param> {
    let type_name = ty.name();
    let out_of_range = || {
        DriverError::Query(format!("parameter {value} does not fit column type {type_name}"))
    };
    Ok(match value {
        Value::Undefined | Value::Null => null_param(type_name),
        Value::Bool(b) => Box::new(*b),
        Value::Int(n) => match type_name {
            "int2" => Box::new(i16::try_from(*n).map_err(|_| out_of_range())?),
            "int4" => Box::new(i32::try_from(*n).map_err(|_| out_of_range())?),
            "float4" => Box::new(*n as f32),
            "float8" => Box::new(*n as f64),
            "text" | "varchar" | "bpchar" | "name" => Box::new(n.to_string()),
            "json" | "jsonb" => Box::new(serde_json::Value::from(*n)),
            _ => Box::new(*n),
        },
        Value::Float(f) => match type_name {
            "float4" => Box::new(*f as f32),
            "int2" | "int4" | "int8" => {
                let n = value.as_i64().ok_or_else(out_of_range)?;
                return to_pg_param(&Value::Int(n), ty);
            }
            "text" | "varchar" | "bpchar" | "name" => Box::new(f.to_string()),
            "json" | "jsonb" => Box::new(value.to_json().unwrap_or(serde_json::Value::Null)),
            _ => Box::new(*f),
        },
        Value::String(s) => match type_name {
            "timestamptz" => Box::new(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| DriverError::Query(format!("invalid timestamp '{s}': {e}")))?
                    .with_timezone(&Utc),
            ),
            "timestamp" => Box::new(
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map_err(|e| DriverError::Query(format!("invalid timestamp '{s}': {e}")))?,
            ),
            "date" => Box::new(
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| DriverError::Query(format!("invalid date '{s}': {e}")))?,
            ),
            "json" | "jsonb" => Box::new(
                serde_json::from_str::<serde_json::Value>(s)
                    .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
            ),
            _ => Box::new(s.clone()),
        },
        Value::Seq(_) | Value::Map(_) => {
            let json = value.to_json().ok_or_else(|| unsupported_param(value))?;
            match type_name {
                "json" | "jsonb" => Box::new(json),
                _ => Box::new(json.to_string()),
            }
        }
        _ => return Err(unsupported_param(value)),
    })
}

/// NULL of the Rust type the server expects for `type_name`.
fn null_param(type_name: &str) -> Param {
    match type_name {
        "bool" => Box::new(None::<bool>),
        "int2" => Box::new(None::<i16>),
        "int4" => Box::new(None::<i32>),
        "int8" => Box::new(None::<i64>),
        "float4" => Box::new(None::<f32>),
        "float8" => Box::new(None::<f64>),
        "json" | "jsonb" => Box::new(None::<serde_json::Value>),
        "timestamptz" => Box::new(None::<DateTime<Utc>>),
        "timestamp" => Box::new(None::<NaiveDateTime>),
        "date" => Box::new(None::<NaiveDate>),
        _ => Box::new(None::<String>),
    }
}

fn column_value(row: &postgres::Row, idx: usize, ty: &Type) -> DriverResult<Value> {
    let read_err = |e: postgres::Error| DriverError::Query(format!("column {idx}: {e}"));
    let value: Value = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx).map_err(read_err)?.into(),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(read_err)?
            .map(i64::from)
            .into(),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(read_err)?
            .map(i64::from)
            .into(),
        "int8" => row.try_get::<_, Option<i64>>(idx).map_err(read_err)?.into(),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(read_err)?
            .map(f64::from)
            .into(),
        "float8" => row.try_get::<_, Option<f64>>(idx).map_err(read_err)?.into(),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(read_err)?
            .map_or(Value::Null, Value::from),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map_err(read_err)?
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            .into(),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map_err(read_err)?
            .map(|ts| ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            .into(),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map_err(read_err)?
            .map(|d| d.to_string())
            .into(),
        other => row
            .try_get::<_, Option<String>>(idx)
            .map_err(|_| {
                DriverError::Query(format!(
                    "column {idx} has unsupported type {other}; cast it to text in the query"
                ))
            })?
            .into(),
    };
    Ok(value)
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
