//! Configuration types and parsing for graviton.yml

use crate::error::{CoreError, CoreResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the configuration file searched for by [`Config::discover`].
pub const CONFIG_FILE_NAME: &str = "graviton.yml";

/// Default metadata table for relational backends.
pub const DEFAULT_METADATA_TABLE: &str = "graviton_migrations";

/// Default metadata collection for document backends.
pub const DEFAULT_METADATA_COLLECTION: &str = "graviton-migrations";

/// Top-level configuration from graviton.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Target stores, processed in order
    pub databases: Vec<DatabaseConfig>,

    /// Directory containing the configuration file; relative paths resolve
    /// against it.
    #[serde(skip)]
    pub root: PathBuf,
}

/// Backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// MongoDB replica set or sharded cluster
    #[serde(alias = "mongo")]
    MongoDb,
    /// PostgreSQL
    #[serde(alias = "postgres")]
    PostgreSql,
    /// SQLite file or in-memory database
    Sqlite,
    /// DuckDB file or in-memory database
    DuckDb,
    /// MySQL or MariaDB
    #[serde(alias = "mariadb")]
    MySql,
}

impl DatabaseKind {
    /// True for the SQL backends sharing the `sql` query builder.
    pub fn is_relational(&self) -> bool {
        !matches!(self, DatabaseKind::MongoDb)
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseKind::MongoDb => write!(f, "mongodb"),
            DatabaseKind::PostgreSql => write!(f, "postgresql"),
            DatabaseKind::Sqlite => write!(f, "sqlite"),
            DatabaseKind::DuckDb => write!(f, "duckdb"),
            DatabaseKind::MySql => write!(f, "mysql"),
        }
    }
}

/// One target store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Name used with `--database`
    pub name: String,

    /// Backend type
    pub kind: DatabaseKind,

    /// Connection string, or a file path for SQLite and DuckDB
    pub connection_url: String,

    /// Database to use inside the server. Required for MongoDB; for MySQL it
    /// overrides the database named in the URL.
    #[serde(default)]
    pub database_name: Option<String>,

    /// Directory holding migration files, relative to the config file
    #[serde(default = "default_migrations_path")]
    pub migrations_path: String,

    /// Table or collection storing the applied set
    #[serde(default)]
    pub metadata_table: Option<String>,

    /// Accepted migration script extensions
    #[serde(default = "default_script_extensions")]
    pub script_extensions: Vec<String>,
}

fn default_migrations_path() -> String {
    "migrations".to_string()
}

fn default_script_extensions() -> Vec<String> {
    vec!["ts".to_string(), "js".to_string(), "mjs".to_string()]
}

impl DatabaseConfig {
    /// Metadata table or collection, falling back to the backend default.
    pub fn metadata_table(&self) -> &str {
        match (&self.metadata_table, self.kind) {
            (Some(table), _) => table,
            (None, DatabaseKind::MongoDb) => DEFAULT_METADATA_COLLECTION,
            (None, _) => DEFAULT_METADATA_TABLE,
        }
    }

    /// Absolute migrations directory for a config rooted at `root`.
    pub fn migrations_dir(&self, root: &Path) -> PathBuf {
        let path = Path::new(&self.migrations_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return invalid("database name must not be empty".to_string());
        }
        if self.connection_url.trim().is_empty() {
            return invalid(format!("database '{}': connection_url is empty", self.name));
        }
        if self.kind == DatabaseKind::MongoDb
            && self.database_name.as_deref().map_or(true, |d| d.trim().is_empty())
        {
            return invalid(format!(
                "database '{}': database_name is required for mongodb",
                self.name
            ));
        }
        let table = self.metadata_table();
        if self.kind.is_relational() && !is_identifier(table) {
            return invalid(format!(
                "database '{}': metadata_table '{table}' must contain only letters, digits and underscores",
                self.name
            ));
        }
        if table.is_empty() {
            return invalid(format!("database '{}': metadata_table is empty", self.name));
        }
        if self.script_extensions.is_empty() {
            return invalid(format!(
                "database '{}': script_extensions must not be empty",
                self.name
            ));
        }
        Ok(())
    }
}

fn invalid<T>(message: String) -> CoreResult<T> {
    Err(CoreError::ConfigInvalid { message })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.is_file() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Parse configuration text after substituting `${VAR}` references from
    /// the process environment.
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let expanded = interpolate_env(content, |name| std::env::var(name).ok());
        let config: Config =
            serde_yaml::from_str(&expanded).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Walk up from `start` looking for [`CONFIG_FILE_NAME`].
    pub fn discover(start: &Path) -> CoreResult<PathBuf> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }
            dir = current.parent();
        }
        Err(CoreError::ConfigNotFound {
            path: format!("{CONFIG_FILE_NAME} (searched upwards from {})", start.display()),
        })
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> CoreResult<()> {
        if self.databases.is_empty() {
            return invalid("at least one database must be configured".to_string());
        }
        let mut seen = HashSet::new();
        for db in &self.databases {
            db.validate()?;
            if !seen.insert(db.name.as_str()) {
                return invalid(format!("duplicate database name '{}'", db.name));
            }
        }
        Ok(())
    }

    /// Look up a database by name.
    pub fn database(&self, name: &str) -> CoreResult<&DatabaseConfig> {
        self.databases
            .iter()
            .find(|db| db.name == name)
            .ok_or_else(|| CoreError::DatabaseNotFound {
                name: name.to_string(),
                available: self
                    .databases
                    .iter()
                    .map(|db| db.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Databases selected by an optional name filter, in configured order.
    pub fn select_databases(&self, name: Option<&str>) -> CoreResult<Vec<&DatabaseConfig>> {
        match name {
            Some(name) => Ok(vec![self.database(name)?]),
            None => Ok(self.databases.iter().collect()),
        }
    }
}

static ENV_REF_RE: OnceLock<Regex> = OnceLock::new();

/// Replace `${NAME}` references using `lookup`.
///
/// Unknown variables are left in place and logged.
pub fn interpolate_env<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let re = ENV_REF_RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex literal")
    });
    re.replace_all(content, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                log::warn!("Environment variable '{name}' is not set; leaving reference unexpanded");
                caps[0].to_string()
            }
        }
    })
    .into_owned()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
