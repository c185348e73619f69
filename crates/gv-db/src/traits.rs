//! Driver trait definition

use crate::error::DriverResult;
use gv_core::MigrationMetadata;
use gv_script::ScriptHost;

/// Transaction body passed to [`Driver::with_transaction`].
pub type TransactionBody<'a> = &'a mut dyn FnMut() -> DriverResult<()>;

/// Store-agnostic migration driver.
///
/// A driver owns one connection to one target store. It persists the
/// applied set, scopes work in transactions, and as a [`ScriptHost`]
/// supplies the handle, globals and recognizers scripts run against. The
/// handle always targets the transaction that is currently open.
pub trait Driver: ScriptHost {
    /// Backend identifier for logging
    fn kind(&self) -> &'static str;

    /// Connect and check backend preconditions. Relational drivers also
    /// create the metadata table.
    fn connect(&mut self) -> DriverResult<()>;

    /// Close the connection. Calling it twice is fine.
    fn disconnect(&mut self) -> DriverResult<()>;

    /// Applied set, sorted by filename ascending.
    fn applied_migrations(&self) -> DriverResult<Vec<MigrationMetadata>>;

    /// Replace the whole applied set: delete everything, then insert
    /// `migrations`. Joins the open transaction if there is one, otherwise
    /// runs in its own.
    fn set_applied_migrations(&self, migrations: &[MigrationMetadata]) -> DriverResult<()>;

    /// Run `body` in a transaction. Commits on `Ok`; rolls back on `Err` or
    /// when the body panics. Transactions do not nest.
    fn with_transaction(&self, body: TransactionBody<'_>) -> DriverResult<()>;
}
