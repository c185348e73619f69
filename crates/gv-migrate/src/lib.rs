//! gv-migrate - Migration set resolver for Graviton
//!
//! Computes pending and applied migration sets from a driver and a
//! migrations directory, selects target subsequences for `up`, `down` and
//! `set-head`, and executes plans one transaction per migration.

pub mod commands;
pub mod error;
pub mod migration;
pub mod plan;
pub mod resolver;

pub use commands::{Migrator, Status};
pub use error::{MigrateError, MigrateResult};
pub use migration::Migration;
pub use plan::{Direction, Plan, ALL};
