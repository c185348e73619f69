//! Pieces shared by the SQL backends: the `sql` tag, the `SQLQuery` class,
//! the `exec`/`query`/`queryOne` handle and the metadata table statements.

use crate::error::{DriverError, DriverResult};
use boa_engine::object::JsObject;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue};
use chrono::{DateTime, Utc};
use gv_core::value::{Extension, HostError, HostFunction, HostResult, Record, Value};
use gv_core::{MigrationFilename, MigrationMetadata};
use gv_script::marshal::is_global;
use gv_script::{Marshaler, ValueRecognizer};
use gv_sql::{build_query, validate, SqlDialect, SqlQuery};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Extension kind carried by [`SqlQuery`] values.
pub(crate) const SQL_QUERY_KIND: &str = "SQLQuery";

/// Defines the `SQLQuery` class the recognizer matches on.
pub(crate) const SQL_QUERY_PRELUDE: &str = r#"
globalThis.SQLQuery = class SQLQuery {
  constructor(query, params) {
    if (typeof query !== "string") {
      throw new TypeError("SQLQuery constructor requires query and params");
    }
    if (!Array.isArray(params)) {
      throw new TypeError("SQLQuery constructor: params must be an array");
    }
    this.query = query;
    this.params = params;
    this.validated = true;
  }
};
"#;

/// One result row, column name to value.
pub(crate) type Row = BTreeMap<String, Value>;

/// Outcome of `exec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Statement execution for one SQL backend.
pub(crate) trait SqlExecutor {
    fn dialect(&self) -> &dyn SqlDialect;

    fn exec(&self, query: &SqlQuery) -> DriverResult<ExecResult>;

    fn query(&self, query: &SqlQuery) -> DriverResult<Vec<Row>>;
}

/// Handle passed to relational migrations.
pub(crate) fn handle(executor: Rc<dyn SqlExecutor>) -> Value {
    let exec = executor.clone();
    let query = executor.clone();
    let query_one = executor;

    Record::new("Handle")
        .method("exec", move |args| {
            let sql = query_argument(args, exec.dialect())?;
            let result = exec.exec(&sql)?;
            let mut record = Record::new("SqlResult").field("rows_affected", result.rows_affected);
            if let Some(id) = result.last_insert_id {
                record = record.field("last_insert_id", id);
            }
            Ok(vec![Value::Record(record)])
        })
        .method("query", move |args| {
            let sql = query_argument(args, query.dialect())?;
            let rows = query.query(&sql)?;
            Ok(vec![Value::Seq(rows.into_iter().map(Value::Map).collect())])
        })
        .method("queryOne", move |args| {
            let sql = query_argument(args, query_one.dialect())?;
            let first = query_one.query(&sql)?.into_iter().next();
            Ok(vec![first.map_or(Value::Null, Value::Map)])
        })
        .into()
}

/// Accepts an `SQLQuery`, a `{query, params}` object, or a query string with
/// an optional parameter array.
pub(crate) fn query_argument(args: &[Value], dialect: &dyn SqlDialect) -> HostResult<SqlQuery> {
    match args.first() {
        Some(Value::Extension(ext)) => ext
            .downcast_ref::<SqlQuery>()
            .cloned()
            .ok_or_else(|| HostError::new(format!("expected an SQLQuery, got {}", ext.kind()))),
        Some(Value::String(text)) => Ok(SqlQuery {
            params: params_argument(args.get(1))?,
            validated: validate(dialect, text),
            query: text.clone(),
        }),
        Some(Value::Map(map)) => {
            let Some(text) = map.get("query").and_then(Value::as_str) else {
                return Err(HostError::new("query object is missing a 'query' string"));
            };
            Ok(SqlQuery {
                params: params_argument(map.get("params"))?,
                validated: validate(dialect, text),
                query: text.to_string(),
            })
        }
        other => Err(HostError::new(format!(
            "expected an SQLQuery (use the sql tag) or a query string, got {}",
            other.map_or("nothing", Value::kind)
        ))),
    }
}

fn params_argument(value: Option<&Value>) -> HostResult<Vec<Value>> {
    match value {
        None | Some(Value::Undefined) | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Seq(items)) => Ok(items.clone()),
        Some(other) => Err(HostError::new(format!(
            "query parameters must be an array, got {}",
            other.kind()
        ))),
    }
}

/// The `sql` template tag.
pub(crate) fn sql_tag(dialect: Rc<dyn SqlDialect>) -> HostFunction {
    HostFunction::new("sql", move |args| {
        let Some(Value::Seq(strings)) = args.first() else {
            return Err(HostError::new("sql tag requires the template strings array"));
        };
        let parts = strings
            .iter()
            .map(|part| match part {
                Value::String(s) => Ok(s.clone()),
                Value::Undefined => Ok(String::new()),
                other => Err(HostError::new(format!(
                    "sql tag: template strings must be strings, got {}",
                    other.kind()
                ))),
            })
            .collect::<HostResult<Vec<_>>>()?;
        let query = build_query(&parts, args[1..].to_vec(), dialect.as_ref())
            .map_err(|e| HostError::new(e.to_string()))?;
        Ok(vec![Value::Extension(Extension::new(SQL_QUERY_KIND, query))])
    })
}

/// Script globals for a relational backend.
pub(crate) fn globals(dialect: Rc<dyn SqlDialect>) -> Vec<(String, Value)> {
    vec![("sql".to_string(), Value::Function(sql_tag(dialect)))]
}

/// Moves [`SqlQuery`] values across the bridge as `SQLQuery` instances.
pub(crate) struct SqlQueryRecognizer;

impl ValueRecognizer for SqlQueryRecognizer {
    fn to_script(
        &self,
        value: &Value,
        marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<JsValue>> {
        let Some(query) = value.as_extension::<SqlQuery>() else {
            return Ok(None);
        };
        let class = ctx.global_object().get(js_string!("SQLQuery"), ctx)?;
        let class = class
            .as_constructor()
            .ok_or_else(|| JsNativeError::typ().with_message("SQLQuery is not defined"))?;
        let params = marshaler.to_script(&Value::Seq(query.params.clone()), ctx)?;
        let instance = class.construct(
            &[JsValue::from(JsString::from(query.query.as_str())), params],
            None,
            ctx,
        )?;
        instance.set(js_string!("validated"), query.validated, true, ctx)?;
        Ok(Some(instance.into()))
    }

    fn from_script(
        &self,
        object: &JsObject,
        marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<Value>> {
        let constructor = object.get(js_string!("constructor"), ctx)?;
        if !is_global(&constructor, "SQLQuery", ctx)? {
            return Ok(None);
        }
        let query = object
            .get(js_string!("query"), ctx)?
            .to_string(ctx)?
            .to_std_string_escaped();
        let params = object.get(js_string!("params"), ctx)?;
        let params = match marshaler.from_script(&params, ctx)? {
            Value::Seq(items) => items,
            Value::Undefined | Value::Null => Vec::new(),
            other => {
                return Err(JsNativeError::typ()
                    .with_message(format!("SQLQuery params must be an array, got {}", other.kind()))
                    .into())
            }
        };
        let validated = object.get(js_string!("validated"), ctx)?.to_boolean();
        let query = SqlQuery {
            query,
            params,
            validated,
        };
        Ok(Some(Value::Extension(Extension::new(SQL_QUERY_KIND, query))))
    }
}

/// Statements over the metadata table.
#[derive(Debug, Clone)]
pub(crate) struct MetadataSql {
    table: String,
    insert: String,
}

impl MetadataSql {
    pub fn new(dialect: &dyn SqlDialect, table: &str) -> Self {
        let table = dialect.quote_ident(table);
        let insert = format!(
            "INSERT INTO {table} (filename, source, applied_at) VALUES ({}, {}, {})",
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3)
        );
        Self { table, insert }
    }

    pub fn create(&self, timestamp_type: &str) -> String {
        self.create_with("TEXT", "TEXT", timestamp_type)
    }

    /// `create` for servers that cannot key on an unbounded `TEXT` column.
    pub fn create_with(&self, key_type: &str, text_type: &str, timestamp_type: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (filename {key_type} PRIMARY KEY, source {text_type} NOT NULL, applied_at {timestamp_type} NOT NULL)",
            self.table
        )
    }

    pub fn select(&self) -> String {
        format!(
            "SELECT filename, source, applied_at FROM {} ORDER BY filename",
            self.table
        )
    }

    pub fn delete_all(&self) -> String {
        format!("DELETE FROM {}", self.table)
    }

    pub fn insert(&self) -> &str {
        &self.insert
    }
}

/// Rebuild a metadata record read from a table row.
pub(crate) fn metadata_from_row(
    filename: String,
    source: String,
    applied_at: DateTime<Utc>,
) -> DriverResult<MigrationMetadata> {
    let filename = MigrationFilename::parse(filename)
        .map_err(|e| DriverError::Persistence(e.to_string()))?;
    Ok(MigrationMetadata::new(filename, source, applied_at))
}

/// Epoch milliseconds, as stored by SQLite and DuckDB, to a timestamp.
pub(crate) fn datetime_from_millis(millis: i64) -> DriverResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DriverError::Persistence(format!("applied_at out of range: {millis}")))
}

/// Parameter value not representable in a SQL column.
pub(crate) fn unsupported_param(value: &Value) -> DriverError {
    DriverError::Query(format!("unsupported query parameter of type {}", value.kind()))
}

#[cfg(test)]
#[path = "relational_test.rs"]
mod tests;
