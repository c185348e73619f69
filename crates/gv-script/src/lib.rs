//! gv-script - Migration scripts for Graviton
//!
//! Compiles migration files (JavaScript or TypeScript) into self-contained
//! bundles and runs their `up`/`down` exports in a fresh interpreter, with a
//! marshaling bridge between host [`Value`](gv_core::Value)s and script
//! values.

pub mod bundle;
pub mod console;
pub mod error;
pub mod host;
mod lexer;
pub mod marshal;
pub mod script;
mod typescript;

pub use bundle::{compile, EXPORT_GLOBAL};
pub use error::{CompileError, Diagnostic, ScriptError, ScriptResult};
pub use host::ScriptHost;
pub use marshal::{Marshaler, ValueRecognizer};
pub use script::Script;
