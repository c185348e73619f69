//! Host/script value marshaling.
//!
//! [`Marshaler`] converts between [`Value`] and interpreter values. Backend
//! [`ValueRecognizer`]s are consulted first on the way into a script and
//! after generic array/object recognition on the way out, so backends can
//! carry their own types (object ids, dates, queries) across the boundary.

use boa_engine::native_function::NativeFunction;
use boa_engine::object::builtins::JsArray;
use boa_engine::object::{FunctionObjectBuilder, JsObject};
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue};
use boa_gc::{Finalize, Trace};
use gv_core::value::{HostFunction, Record, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Largest integer a script number represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Deepest object nesting accepted from scripts.
const MAX_DEPTH: usize = 64;

/// Backend hook for custom value shapes.
///
/// Both methods return `Ok(None)` for values the recognizer does not own.
pub trait ValueRecognizer {
    fn to_script(
        &self,
        value: &Value,
        marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<JsValue>>;

    fn from_script(
        &self,
        value: &JsObject,
        marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<Value>>;
}

/// Converts values across the host/script boundary.
#[derive(Clone, Default)]
pub struct Marshaler {
    recognizers: Rc<Vec<Rc<dyn ValueRecognizer>>>,
    /// Objects being converted to host values, outermost first
    path: Rc<RefCell<Vec<JsObject>>>,
}

/// Captures of a host function installed in a script. Holds host data only.
#[derive(Trace, Finalize)]
struct HostCall {
    #[unsafe_ignore_trace]
    marshaler: Marshaler,
    #[unsafe_ignore_trace]
    host: HostFunction,
}

/// Pops the conversion path when an object has been converted.
struct PathGuard<'a> {
    path: &'a RefCell<Vec<JsObject>>,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.path.borrow_mut().pop();
    }
}

impl Marshaler {
    pub fn new(recognizers: Vec<Rc<dyn ValueRecognizer>>) -> Self {
        Self {
            recognizers: Rc::new(recognizers),
            path: Rc::default(),
        }
    }

    /// Convert a host value into a script value.
    pub fn to_script(&self, value: &Value, ctx: &mut Context) -> JsResult<JsValue> {
        for recognizer in self.recognizers.iter() {
            if let Some(js) = recognizer.to_script(value, self, ctx)? {
                return Ok(js);
            }
        }
        match value {
            Value::Undefined => Ok(JsValue::undefined()),
            Value::Null => Ok(JsValue::null()),
            Value::Bool(b) => Ok(JsValue::from(*b)),
            Value::Int(n) => Ok(int_to_script(*n)),
            Value::Float(f) => Ok(JsValue::from(*f)),
            Value::String(s) => Ok(JsValue::from(JsString::from(s.as_str()))),
            Value::Seq(items) => {
                let array = JsArray::new(ctx);
                for item in items {
                    let js = self.to_script(item, ctx)?;
                    array.push(js, ctx)?;
                }
                Ok(array.into())
            }
            Value::Map(map) => {
                let object = JsObject::with_object_proto(ctx.intrinsics());
                for (key, item) in map {
                    let js = self.to_script(item, ctx)?;
                    object.create_data_property_or_throw(JsString::from(key.as_str()), js, ctx)?;
                }
                Ok(object.into())
            }
            Value::Record(record) => self.record_to_script(record, ctx),
            Value::Function(func) => Ok(self.function_to_script(func, ctx)),
            Value::Extension(ext) => Err(JsNativeError::typ()
                .with_message(format!(
                    "host value of kind '{}' cannot be passed to scripts",
                    ext.kind()
                ))
                .into()),
        }
    }

    fn record_to_script(&self, record: &Record, ctx: &mut Context) -> JsResult<JsValue> {
        let object = JsObject::with_object_proto(ctx.intrinsics());
        for (name, value) in record.fields() {
            let js = self.to_script(value, ctx)?;
            object.create_data_property_or_throw(JsString::from(lower_camel(name).as_str()), js, ctx)?;
        }
        for method in record.methods() {
            let js = self.function_to_script(method, ctx);
            object.create_data_property_or_throw(
                JsString::from(lower_camel(method.name()).as_str()),
                js,
                ctx,
            )?;
        }
        Ok(object.into())
    }

    fn function_to_script(&self, func: &HostFunction, ctx: &mut Context) -> JsValue {
        let captures = HostCall {
            marshaler: self.clone(),
            host: func.clone(),
        };
        let native = NativeFunction::from_copy_closure_with_captures(
            |_this, args, call: &HostCall, ctx| {
                let mut host_args = Vec::with_capacity(args.len());
                for arg in args {
                    host_args.push(call.marshaler.from_script(arg, ctx)?);
                }
                let results = call.host.call(&host_args).map_err(|e| {
                    JsNativeError::error()
                        .with_message(format!("{}: {}", call.host.name(), e.message()))
                })?;
                call.marshaler.results_to_script(results, ctx)
            },
            captures,
        );
        FunctionObjectBuilder::new(ctx.realm(), native)
            .name(JsString::from(lower_camel(func.name()).as_str()))
            .length(0)
            .constructor(false)
            .build()
            .into()
    }

    /// Map zero, one, or many host results to `undefined`, the value, or an
    /// array.
    pub fn results_to_script(&self, mut results: Vec<Value>, ctx: &mut Context) -> JsResult<JsValue> {
        match results.len() {
            0 => Ok(JsValue::undefined()),
            1 => {
                let only = results.remove(0);
                self.to_script(&only, ctx)
            }
            _ => self.to_script(&Value::Seq(results), ctx),
        }
    }

    /// Convert a script value into a host value.
    pub fn from_script(&self, value: &JsValue, ctx: &mut Context) -> JsResult<Value> {
        if value.is_undefined() {
            return Ok(Value::Undefined);
        }
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(b) = value.as_boolean() {
            return Ok(Value::Bool(b));
        }
        if let Some(s) = value.as_string() {
            return Ok(Value::String(s.to_std_string_escaped()));
        }
        if let Some(n) = value.as_number() {
            return Ok(number_to_value(n));
        }
        let Some(object) = value.as_object() else {
            return Err(unsupported(if value.is_bigint() { "bigint" } else { "symbol" }));
        };
        let object = object.clone();
        if object.is_callable() {
            return Err(unsupported("function"));
        }
        let _guard = self.enter(&object)?;

        let constructor = object.get(js_string!("constructor"), ctx)?;
        if is_global(&constructor, "Array", ctx)? {
            return self.array_from_script(&object, ctx);
        }
        if is_global(&constructor, "Object", ctx)? {
            return self.object_from_script(&object, ctx);
        }
        for recognizer in self.recognizers.iter() {
            if let Some(host) = recognizer.from_script(&object, self, ctx)? {
                return Ok(host);
            }
        }
        if is_global(&constructor, "Date", ctx)? {
            let iso = call_method(&object, "toISOString", &[], ctx)?;
            return self.from_script(&iso, ctx);
        }
        json_export(value, ctx)
    }

    /// Push `object` onto the conversion path. Fails when it is already on
    /// the path or the path is too deep.
    fn enter(&self, object: &JsObject) -> JsResult<PathGuard<'_>> {
        let mut path = self.path.borrow_mut();
        if path.iter().any(|outer| JsObject::equals(outer, object)) {
            return Err(JsNativeError::typ()
                .with_message("cyclic value cannot be passed to the host")
                .into());
        }
        if path.len() >= MAX_DEPTH {
            return Err(JsNativeError::range()
                .with_message(format!("value nested deeper than {MAX_DEPTH} levels cannot be passed to the host"))
                .into());
        }
        path.push(object.clone());
        Ok(PathGuard { path: &self.path })
    }

    fn array_from_script(&self, array: &JsObject, ctx: &mut Context) -> JsResult<Value> {
        let length = array.get(js_string!("length"), ctx)?.to_length(ctx)?;
        let length = u32::try_from(length)
            .map_err(|_| JsNativeError::range().with_message("array too large for the host"))?;
        let mut items = Vec::with_capacity(length as usize);
        for index in 0..length {
            let item = array.get(index, ctx)?;
            items.push(self.from_script(&item, ctx)?);
        }
        Ok(Value::Seq(items))
    }

    fn object_from_script(&self, object: &JsObject, ctx: &mut Context) -> JsResult<Value> {
        let object_ctor = ctx.global_object().get(js_string!("Object"), ctx)?;
        let keys_fn = object_ctor
            .as_object()
            .ok_or_else(|| JsNativeError::typ().with_message("global Object is missing"))?
            .get(js_string!("keys"), ctx)?;
        let keys = keys_fn
            .as_callable()
            .ok_or_else(|| JsNativeError::typ().with_message("Object.keys is not callable"))?
            .call(&object_ctor, &[JsValue::from(object.clone())], ctx)?;
        let Value::Seq(keys) = self.from_script(&keys, ctx)? else {
            return Err(JsNativeError::typ()
                .with_message("Object.keys did not return an array")
                .into());
        };

        let mut map = BTreeMap::new();
        for key in keys {
            let Value::String(key) = key else {
                continue;
            };
            let item = object.get(JsString::from(key.as_str()), ctx)?;
            map.insert(key, self.from_script(&item, ctx)?);
        }
        Ok(Value::Map(map))
    }
}

/// Convert through `JSON.stringify`, which honors `toJSON`, drops
/// `undefined` members and rejects cycles.
fn json_export(value: &JsValue, ctx: &mut Context) -> JsResult<Value> {
    let json = ctx.global_object().get(js_string!("JSON"), ctx)?;
    let json = json
        .as_object()
        .ok_or_else(|| JsNativeError::typ().with_message("global JSON is missing"))?
        .clone();
    let text = call_method(&json, "stringify", &[value.clone()], ctx)?;
    let Some(text) = text.as_string() else {
        return Ok(Value::Undefined);
    };
    serde_json::from_str::<serde_json::Value>(&text.to_std_string_escaped())
        .map(Value::from)
        .map_err(|e| {
            JsNativeError::typ()
                .with_message(format!("JSON export produced invalid JSON: {e}"))
                .into()
        })
}

fn unsupported(kind: &str) -> boa_engine::JsError {
    JsNativeError::typ()
        .with_message(format!("cannot pass a {kind} to the host"))
        .into()
}

fn int_to_script(n: i64) -> JsValue {
    i32::try_from(n).map_or_else(|_| JsValue::from(n as f64), JsValue::from)
}

fn number_to_value(n: f64) -> Value {
    let negative_zero = n == 0.0 && n.is_sign_negative();
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER && !negative_zero {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

/// True when `value` is the global binding called `name`.
pub fn is_global(value: &JsValue, name: &str, ctx: &mut Context) -> JsResult<bool> {
    let global = ctx.global_object().get(JsString::from(name), ctx)?;
    Ok(!global.is_undefined() && value.strict_equals(&global))
}

/// Invoke `object[name](...args)`.
pub fn call_method(
    object: &JsObject,
    name: &str,
    args: &[JsValue],
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let method = object.get(JsString::from(name), ctx)?;
    let callable = method.as_callable().ok_or_else(|| {
        JsNativeError::typ().with_message(format!("'{name}' is not a function"))
    })?;
    callable.call(&JsValue::from(object.clone()), args, ctx)
}

/// Host-style name to script-style lower camel case:
/// `rows_affected` -> `rowsAffected`, `InsertOne` -> `insertOne`, `ID` -> `id`.
pub fn lower_camel(name: &str) -> String {
    let trimmed = name.trim_start_matches('_');
    let mut out = String::with_capacity(name.len());
    out.push_str(&name[..name.len() - trimmed.len()]);

    for (index, segment) in trimmed.split('_').filter(|s| !s.is_empty()).enumerate() {
        if index == 0 {
            out.push_str(&lower_leading(segment));
        } else {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// Lowercase the leading run of capitals, keeping the last one when it
/// starts the next word (`URLPath` -> `urlPath`).
fn lower_leading(segment: &str) -> String {
    let chars: Vec<char> = segment.chars().collect();
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();
    let lower_count = if upper_run > 1 && upper_run < chars.len() {
        upper_run - 1
    } else {
        upper_run
    };
    chars
        .iter()
        .enumerate()
        .flat_map(|(i, c)| {
            if i < lower_count {
                c.to_lowercase().collect::<Vec<_>>()
            } else {
                vec![*c]
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "marshal_test.rs"]
mod tests;
