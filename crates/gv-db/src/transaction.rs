//! Transaction scoping shared by every backend.

use crate::error::{DriverError, DriverResult};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

/// Backend primitives for a single transaction.
pub(crate) trait TransactionControl {
    fn begin(&self) -> DriverResult<()>;
    fn commit(&self) -> DriverResult<()>;
    fn rollback(&self) -> DriverResult<()>;
}

/// Tracks whether a transaction is open and runs bodies inside one.
#[derive(Debug, Default)]
pub(crate) struct Transactor {
    active: Cell<bool>,
}

impl Transactor {
    /// Begin, run `body`, then commit or roll back.
    pub fn run(
        &self,
        control: &dyn TransactionControl,
        body: &mut dyn FnMut() -> DriverResult<()>,
    ) -> DriverResult<()> {
        if self.active.get() {
            return Err(DriverError::Transaction(
                "nested transactions are not supported".to_string(),
            ));
        }

        control.begin()?;
        self.active.set(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body()));
        self.active.set(false);

        let result = outcome.unwrap_or_else(|payload| Err(DriverError::Panicked(panic_message(payload))));
        match result {
            Ok(()) => {
                if let Err(commit_err) = control.commit() {
                    if let Err(rollback_err) = control.rollback() {
                        log::debug!("Rollback after failed commit: {rollback_err}");
                    }
                    return Err(commit_err);
                }
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = control.rollback() {
                    log::warn!("Rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Run `body` in the open transaction, or in a new one if none is open.
    pub fn join_or_run(
        &self,
        control: &dyn TransactionControl,
        body: &mut dyn FnMut() -> DriverResult<()>,
    ) -> DriverResult<()> {
        if self.active.get() {
            body()
        } else {
            self.run(control, body)
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Transaction control through plain SQL statements.
///
/// `execute` runs one statement and reports failures as plain text.
pub(crate) struct SqlStatements<F>
where
    F: Fn(&str) -> Result<(), String>,
{
    pub execute: F,
}

impl<F> TransactionControl for SqlStatements<F>
where
    F: Fn(&str) -> Result<(), String>,
{
    fn begin(&self) -> DriverResult<()> {
        (self.execute)("BEGIN TRANSACTION")
            .map_err(|e| DriverError::Transaction(format!("BEGIN failed: {e}")))
    }

    fn commit(&self) -> DriverResult<()> {
        (self.execute)("COMMIT").map_err(|e| DriverError::Transaction(format!("COMMIT failed: {e}")))
    }

    fn rollback(&self) -> DriverResult<()> {
        (self.execute)("ROLLBACK")
            .map_err(|e| DriverError::Transaction(format!("ROLLBACK failed: {e}")))
    }
}

#[cfg(test)]
#[path = "transaction_test.rs"]
mod tests;
