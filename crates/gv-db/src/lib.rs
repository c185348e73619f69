//! gv-db - Database drivers for Graviton
//!
//! This crate provides the `Driver` trait, transaction scoping shared by
//! every backend, and drivers for MongoDB, PostgreSQL, MySQL, SQLite and
//! DuckDB.

pub mod duckdb;
pub mod error;
pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub(crate) mod relational;
pub mod sqlite;
pub mod traits;
pub(crate) mod transaction;

pub use self::duckdb::DuckDbDriver;
pub use self::mongodb::MongoDriver;
pub use self::mysql::MySqlDriver;
pub use self::postgres::PostgresDriver;
pub use self::sqlite::SqliteDriver;
pub use error::{DriverError, DriverResult};
pub use traits::{Driver, TransactionBody};

use gv_core::{DatabaseConfig, DatabaseKind};

/// Unconnected driver for `config.kind`.
pub fn driver_for(config: &DatabaseConfig) -> Box<dyn Driver> {
    match config.kind {
        DatabaseKind::MongoDb => Box::new(MongoDriver::new(config)),
        DatabaseKind::PostgreSql => Box::new(PostgresDriver::new(config)),
        DatabaseKind::Sqlite => Box::new(SqliteDriver::new(config)),
        DatabaseKind::DuckDb => Box::new(DuckDbDriver::new(config)),
        DatabaseKind::MySql => Box::new(MySqlDriver::new(config)),
    }
}

/// Build the driver for `config` and connect it.
pub fn connect_driver(config: &DatabaseConfig) -> DriverResult<Box<dyn Driver>> {
    let mut driver = driver_for(config);
    log::debug!(
        "Connecting to {} database '{}'",
        driver.kind(),
        config.name
    );
    driver.connect()?;
    Ok(driver)
}
