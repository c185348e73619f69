//! gv-core - Core library for Graviton
//!
//! This crate provides the types shared by every other Graviton crate:
//! configuration parsing, the migration filename contract, the persisted
//! migration metadata record, and the host-side [`Value`] model that crosses
//! the script bridge.

pub mod config;
pub mod error;
pub mod metadata;
pub mod migration_filename;
pub mod value;

pub use config::{Config, DatabaseConfig, DatabaseKind};
pub use error::{CoreError, CoreResult};
pub use metadata::MigrationMetadata;
pub use migration_filename::MigrationFilename;
pub use value::{Extension, HostError, HostFunction, HostResult, Record, Value};
