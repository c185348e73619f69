//! BSON conversion and the `ObjectId`/`Date` recognizers.

use crate::error::{DriverError, DriverResult};
use boa_engine::object::JsObject;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue};
use gv_core::value::{Extension, HostError, HostFunction, Value};
use gv_script::marshal::{call_method, is_global};
use gv_script::{Marshaler, ValueRecognizer};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, DateTime as BsonDateTime, Document};

pub(crate) const OBJECT_ID_KIND: &str = "ObjectId";
pub(crate) const DATE_KIND: &str = "Date";

/// Host global backing the `ObjectId` class.
pub(crate) const OBJECT_ID_HEX_GLOBAL: &str = "__objectIdHex";

/// `new ObjectId()` generates an id, `new ObjectId(hex)` parses one.
pub(crate) const OBJECT_ID_PRELUDE: &str = r#"
globalThis.ObjectId = class ObjectId {
  constructor(hex) {
    this.hex = hex === undefined ? __objectIdHex() : __objectIdHex(String(hex));
  }
  toHexString() {
    return this.hex;
  }
  toString() {
    return this.hex;
  }
  toJSON() {
    return this.hex;
  }
  equals(other) {
    return other instanceof ObjectId && other.hex === this.hex;
  }
};
"#;

/// Generates or validates object id hex strings.
pub(crate) fn object_id_hex() -> HostFunction {
    HostFunction::new(OBJECT_ID_HEX_GLOBAL, |args| {
        let id = match args.first() {
            None | Some(Value::Undefined) => ObjectId::new(),
            Some(Value::String(hex)) => ObjectId::parse_str(hex)
                .map_err(|e| HostError::new(format!("invalid ObjectId '{hex}': {e}")))?,
            Some(other) => {
                return Err(HostError::new(format!(
                    "ObjectId expects a hex string, got {}",
                    other.kind()
                )))
            }
        };
        Ok(vec![Value::String(id.to_hex())])
    })
}

pub(crate) fn object_id_value(id: ObjectId) -> Value {
    Value::Extension(Extension::new(OBJECT_ID_KIND, id))
}

pub(crate) fn date_value(date: BsonDateTime) -> Value {
    Value::Extension(Extension::new(DATE_KIND, date))
}

/// Host value to BSON. `undefined` fields are left out of documents.
pub(crate) fn to_bson(value: &Value) -> DriverResult<Bson> {
    Ok(match value {
        Value::Undefined | Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Int(n) => Bson::Int64(*n),
        Value::Float(f) => Bson::Double(*f),
        Value::String(s) => Bson::String(s.clone()),
        Value::Seq(items) => Bson::Array(items.iter().map(to_bson).collect::<DriverResult<_>>()?),
        Value::Map(_) => Bson::Document(to_document(value)?),
        Value::Extension(ext) => {
            if let Some(id) = ext.downcast_ref::<ObjectId>() {
                Bson::ObjectId(*id)
            } else if let Some(date) = ext.downcast_ref::<BsonDateTime>() {
                Bson::DateTime(*date)
            } else {
                return Err(unsupported(value));
            }
        }
        Value::Record(_) | Value::Function(_) => return Err(unsupported(value)),
    })
}

/// A map as a document. Missing or `null` arguments are the empty document.
pub(crate) fn to_document(value: &Value) -> DriverResult<Document> {
    match value {
        Value::Undefined | Value::Null => Ok(Document::new()),
        Value::Map(map) => {
            let mut doc = Document::new();
            for (key, item) in map {
                if matches!(item, Value::Undefined) {
                    continue;
                }
                doc.insert(key.clone(), to_bson(item)?);
            }
            Ok(doc)
        }
        other => Err(DriverError::Query(format!(
            "expected a document object, got {}",
            other.kind()
        ))),
    }
}

fn unsupported(value: &Value) -> DriverError {
    DriverError::Query(format!("cannot store a {} in a document", value.kind()))
}

/// BSON to host value. Types without a host shape use relaxed extended JSON.
pub(crate) fn from_bson(bson: Bson) -> Value {
    match bson {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::Int(i64::from(n)),
        Bson::Int64(n) => Value::Int(n),
        Bson::Double(f) => Value::Float(f),
        Bson::String(s) => Value::String(s),
        Bson::Array(items) => Value::Seq(items.into_iter().map(from_bson).collect()),
        Bson::Document(doc) => from_document(doc),
        Bson::ObjectId(id) => object_id_value(id),
        Bson::DateTime(date) => date_value(date),
        other => Value::from(other.into_relaxed_extjson()),
    }
}

pub(crate) fn from_document(doc: Document) -> Value {
    Value::Map(doc.into_iter().map(|(k, v)| (k, from_bson(v))).collect())
}

/// Carries object ids as `ObjectId` instances.
pub(crate) struct ObjectIdRecognizer;

impl ValueRecognizer for ObjectIdRecognizer {
    fn to_script(
        &self,
        value: &Value,
        _marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<JsValue>> {
        let Some(id) = value.as_extension::<ObjectId>() else {
            return Ok(None);
        };
        let class = ctx.global_object().get(js_string!("ObjectId"), ctx)?;
        let class = class
            .as_constructor()
            .ok_or_else(|| JsNativeError::typ().with_message("ObjectId is not defined"))?;
        let instance = class.construct(&[JsValue::from(JsString::from(id.to_hex()))], None, ctx)?;
        Ok(Some(instance.into()))
    }

    fn from_script(
        &self,
        object: &JsObject,
        _marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<Value>> {
        let constructor = object.get(js_string!("constructor"), ctx)?;
        if !is_global(&constructor, "ObjectId", ctx)? {
            return Ok(None);
        }
        let hex = call_method(object, "toHexString", &[], ctx)?
            .to_string(ctx)?
            .to_std_string_escaped();
        let id = ObjectId::parse_str(&hex).map_err(|e| {
            JsNativeError::typ().with_message(format!("invalid ObjectId '{hex}': {e}"))
        })?;
        Ok(Some(object_id_value(id)))
    }
}

/// Carries BSON dates as script `Date`s.
pub(crate) struct DateRecognizer;

impl ValueRecognizer for DateRecognizer {
    fn to_script(
        &self,
        value: &Value,
        _marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<JsValue>> {
        let Some(date) = value.as_extension::<BsonDateTime>() else {
            return Ok(None);
        };
        let class = ctx.global_object().get(js_string!("Date"), ctx)?;
        let class = class
            .as_constructor()
            .ok_or_else(|| JsNativeError::typ().with_message("Date is not defined"))?;
        let millis = JsValue::from(date.timestamp_millis() as f64);
        Ok(Some(class.construct(&[millis], None, ctx)?.into()))
    }

    fn from_script(
        &self,
        object: &JsObject,
        _marshaler: &Marshaler,
        ctx: &mut Context,
    ) -> JsResult<Option<Value>> {
        let constructor = object.get(js_string!("constructor"), ctx)?;
        if !is_global(&constructor, "Date", ctx)? {
            return Ok(None);
        }
        let millis = call_method(object, "getTime", &[], ctx)?.to_number(ctx)?;
        if !millis.is_finite() {
            return Err(JsNativeError::range()
                .with_message("cannot store an invalid Date")
                .into());
        }
        Ok(Some(date_value(BsonDateTime::from_millis(millis as i64))))
    }
}

#[cfg(test)]
#[path = "convert_test.rs"]
mod tests;
