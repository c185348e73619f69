//! Compiled migration scripts.

use crate::bundle::{self, EXPORT_GLOBAL};
use crate::console::console;
use crate::error::{CompileError, ScriptError, ScriptResult};
use crate::host::ScriptHost;
use crate::marshal::Marshaler;
use boa_engine::object::JsObject;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsString, JsValue, Source};
use gv_core::migration_filename::MigrationFilename;
use gv_core::value::Value;
use std::path::Path;

/// Global the handle is installed under, in addition to being passed to
/// `up`/`down`.
const HANDLE_GLOBAL: &str = "__handle__";

/// A compiled migration bundle and the filename it came from.
///
/// Nothing is kept between calls: every `up`, `down` and `declared_name`
/// evaluates the bundle in a new interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    origin: String,
    source: String,
}

impl Script {
    /// Compile the migration file at `path`.
    pub fn compile(path: &Path) -> Result<Self, CompileError> {
        let source = bundle::compile(path)?;
        let origin = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { origin, source })
    }

    /// Wrap an already compiled bundle, e.g. one read back from the store.
    pub fn from_source(origin: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            source: source.into(),
        }
    }

    /// Filename the script was compiled from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Bundle text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Name derived from the filename (`20240101000000-init.migration.ts` is
    /// `init`).
    pub fn name(&self) -> String {
        match MigrationFilename::parse(&self.origin) {
            Ok(filename) => filename.name().to_string(),
            Err(_) => self
                .origin
                .split('.')
                .next()
                .unwrap_or(&self.origin)
                .to_string(),
        }
    }

    /// The `name` the script exports, if any.
    pub fn declared_name<H: ScriptHost + ?Sized>(&self, host: &H) -> ScriptResult<Option<String>> {
        let mut ctx = Context::default();
        self.prepare(host, &mut ctx)?;
        let migration = self.evaluate(&mut ctx)?;
        let name = migration
            .get(js_string!("name"), &mut ctx)
            .map_err(|e| self.runtime(&e, &mut ctx))?;
        Ok(name.as_string().map(|s| s.to_std_string_escaped()))
    }

    pub fn up<H: ScriptHost + ?Sized>(&self, host: &H) -> ScriptResult<()> {
        self.call(host, "up")
    }

    pub fn down<H: ScriptHost + ?Sized>(&self, host: &H) -> ScriptResult<()> {
        self.call(host, "down")
    }

    fn call<H: ScriptHost + ?Sized>(&self, host: &H, export: &str) -> ScriptResult<()> {
        let mut ctx = Context::default();
        let marshaler = self.prepare(host, &mut ctx)?;
        let handle = self.define(&mut ctx, &marshaler, HANDLE_GLOBAL, &host.handle())?;
        let migration = self.evaluate(&mut ctx)?;

        let function = migration
            .get(JsString::from(export), &mut ctx)
            .map_err(|e| self.runtime(&e, &mut ctx))?;
        let Some(function) = function.as_callable() else {
            return Err(ScriptError::MissingExport {
                origin: self.origin.clone(),
                export: export.to_string(),
            });
        };

        log::debug!("Running {} of {}", export, self.origin);
        let result = function
            .call(&JsValue::from(migration.clone()), &[handle], &mut ctx)
            .map_err(|e| self.runtime(&e, &mut ctx))?;
        if is_thenable(&result, &mut ctx) {
            return Err(ScriptError::Asynchronous {
                origin: self.origin.clone(),
                export: export.to_string(),
            });
        }
        Ok(())
    }

    /// Install console, host globals and prelude.
    fn prepare<H: ScriptHost + ?Sized>(&self, host: &H, ctx: &mut Context) -> ScriptResult<Marshaler> {
        let marshaler = Marshaler::new(host.recognizers());
        self.define(ctx, &marshaler, "console", &Value::Record(console(&self.origin)))?;
        for (name, value) in host.globals() {
            self.define(ctx, &marshaler, &name, &value)?;
        }
        if let Some(prelude) = host.prelude() {
            ctx.eval(Source::from_bytes(prelude))
                .map_err(|e| self.runtime(&e, ctx))?;
        }
        Ok(marshaler)
    }

    fn define(
        &self,
        ctx: &mut Context,
        marshaler: &Marshaler,
        name: &str,
        value: &Value,
    ) -> ScriptResult<JsValue> {
        let js = marshaler
            .to_script(value, ctx)
            .map_err(|e| self.marshal(&e, ctx))?;
        ctx.register_global_property(JsString::from(name), js.clone(), Attribute::all())
            .map_err(|e| self.marshal(&e, ctx))?;
        Ok(js)
    }

    /// Run the bundle and return the exported migration object.
    fn evaluate(&self, ctx: &mut Context) -> ScriptResult<JsObject> {
        ctx.eval(Source::from_bytes(self.source.as_bytes()))
            .map_err(|e| self.runtime(&e, ctx))?;
        let migration = ctx
            .global_object()
            .get(JsString::from(EXPORT_GLOBAL), ctx)
            .map_err(|e| self.runtime(&e, ctx))?;
        migration
            .as_object()
            .cloned()
            .ok_or_else(|| ScriptError::MissingExport {
                origin: self.origin.clone(),
                export: EXPORT_GLOBAL.to_string(),
            })
    }

    fn runtime(&self, err: &JsError, ctx: &mut Context) -> ScriptError {
        ScriptError::Runtime {
            origin: self.origin.clone(),
            message: error_message(err, ctx),
        }
    }

    fn marshal(&self, err: &JsError, ctx: &mut Context) -> ScriptError {
        ScriptError::Marshal {
            origin: self.origin.clone(),
            message: error_message(err, ctx),
        }
    }
}

fn error_message(err: &JsError, ctx: &mut Context) -> String {
    err.try_native(ctx)
        .map_or_else(|_| err.to_string(), |native| native.to_string())
}

fn is_thenable(value: &JsValue, ctx: &mut Context) -> bool {
    value
        .as_object()
        .and_then(|object| object.get(js_string!("then"), ctx).ok())
        .is_some_and(|then| then.is_callable())
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
