//! The `collection(name)` handle given to document migrations.

use super::convert::{from_bson, from_document, to_document};
use super::MongoState;
use crate::error::{DriverError, DriverResult};
use gv_core::value::{HostError, HostResult, Record, Value};
use mongodb::bson::{Bson, Document};
use mongodb::options::{FindOneOptions, FindOptions};
use mongodb::sync::Collection;
use std::rc::Rc;

pub(crate) fn handle(state: Rc<MongoState>) -> Value {
    Record::new("Handle")
        .method("collection", move |args| {
            let Some(Value::String(name)) = args.first() else {
                return Err(HostError::new("collection(name) requires a collection name"));
            };
            Ok(vec![collection(state.clone(), name)])
        })
        .into()
}

struct CollectionOps {
    state: Rc<MongoState>,
    coll: Collection<Document>,
}

type Op = fn(&CollectionOps, &[Value]) -> DriverResult<Value>;

fn bind(ops: &Rc<CollectionOps>, op: Op) -> impl Fn(&[Value]) -> HostResult<Vec<Value>> {
    let ops = ops.clone();
    move |args| Ok(vec![op(&ops, args)?])
}

fn collection(state: Rc<MongoState>, name: &str) -> Value {
    let coll = state.database.collection::<Document>(name);
    let ops = Rc::new(CollectionOps { state, coll });
    Record::new("Collection")
        .field("name", name)
        .method("insertOne", bind(&ops, CollectionOps::insert_one))
        .method("insertMany", bind(&ops, CollectionOps::insert_many))
        .method("find", bind(&ops, CollectionOps::find))
        .method("findOne", bind(&ops, CollectionOps::find_one))
        .method("updateOne", bind(&ops, CollectionOps::update_one))
        .method("updateMany", bind(&ops, CollectionOps::update_many))
        .method("deleteOne", bind(&ops, CollectionOps::delete_one))
        .method("deleteMany", bind(&ops, CollectionOps::delete_many))
        .into()
}

fn arg(args: &[Value], index: usize) -> &Value {
    args.get(index).unwrap_or(&Value::Undefined)
}

fn command_error(err: mongodb::error::Error) -> DriverError {
    DriverError::Query(err.to_string())
}

fn count(n: u64) -> Value {
    Value::from(n)
}

impl CollectionOps {
    fn insert_one(&self, args: &[Value]) -> DriverResult<Value> {
        let doc = to_document(arg(args, 0))?;
        let mut session = self.state.session.borrow_mut();
        let result = match session.as_mut() {
            Some(session) => self.coll.insert_one_with_session(doc, None, session),
            None => self.coll.insert_one(doc, None),
        }
        .map_err(command_error)?;
        Ok(Record::new("InsertOneResult")
            .field("inserted_id", from_bson(result.inserted_id))
            .into())
    }

    fn insert_many(&self, args: &[Value]) -> DriverResult<Value> {
        let Value::Seq(items) = arg(args, 0) else {
            return Err(DriverError::Query(
                "insertMany expects an array of documents".to_string(),
            ));
        };
        let docs = items.iter().map(to_document).collect::<DriverResult<Vec<_>>>()?;
        if docs.is_empty() {
            return Ok(Record::new("InsertManyResult")
                .field("inserted_ids", Value::Seq(Vec::new()))
                .into());
        }
        let mut session = self.state.session.borrow_mut();
        let result = match session.as_mut() {
            Some(session) => self.coll.insert_many_with_session(docs, None, session),
            None => self.coll.insert_many(docs, None),
        }
        .map_err(command_error)?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(Record::new("InsertManyResult")
            .field(
                "inserted_ids",
                Value::Seq(ids.into_iter().map(|(_, id)| from_bson(id)).collect()),
            )
            .into())
    }

    fn find(&self, args: &[Value]) -> DriverResult<Value> {
        let filter = to_document(arg(args, 0))?;
        let options = find_options(arg(args, 1))?;
        let mut session = self.state.session.borrow_mut();
        let docs = match session.as_mut() {
            Some(session) => {
                let mut cursor = self
                    .coll
                    .find_with_session(filter, options, session)
                    .map_err(command_error)?;
                cursor.iter(session).collect::<Result<Vec<_>, _>>()
            }
            None => self
                .coll
                .find(filter, options)
                .map_err(command_error)?
                .collect::<Result<Vec<_>, _>>(),
        }
        .map_err(command_error)?;
        Ok(Value::Seq(docs.into_iter().map(from_document).collect()))
    }

    fn find_one(&self, args: &[Value]) -> DriverResult<Value> {
        let filter = to_document(arg(args, 0))?;
        let options = find_one_options(arg(args, 1))?;
        let mut session = self.state.session.borrow_mut();
        let doc = match session.as_mut() {
            Some(session) => self.coll.find_one_with_session(filter, options, session),
            None => self.coll.find_one(filter, options),
        }
        .map_err(command_error)?;
        Ok(doc.map_or(Value::Null, from_document))
    }

    fn update_one(&self, args: &[Value]) -> DriverResult<Value> {
        self.update(args, false)
    }

    fn update_many(&self, args: &[Value]) -> DriverResult<Value> {
        self.update(args, true)
    }

    fn update(&self, args: &[Value], many: bool) -> DriverResult<Value> {
        let filter = to_document(arg(args, 0))?;
        let update = to_document(arg(args, 1))?;
        if update.is_empty() {
            return Err(DriverError::Query("update document must not be empty".to_string()));
        }
        let mut session = self.state.session.borrow_mut();
        let result = match (session.as_mut(), many) {
            (Some(session), false) => self.coll.update_one_with_session(filter, update, None, session),
            (Some(session), true) => self.coll.update_many_with_session(filter, update, None, session),
            (None, false) => self.coll.update_one(filter, update, None),
            (None, true) => self.coll.update_many(filter, update, None),
        }
        .map_err(command_error)?;

        let mut record = Record::new("UpdateResult")
            .field("matched_count", count(result.matched_count))
            .field("modified_count", count(result.modified_count));
        if let Some(id) = result.upserted_id {
            record = record.field("upserted_id", from_bson(id));
        }
        Ok(record.into())
    }

    fn delete_one(&self, args: &[Value]) -> DriverResult<Value> {
        self.delete(args, false)
    }

    fn delete_many(&self, args: &[Value]) -> DriverResult<Value> {
        self.delete(args, true)
    }

    fn delete(&self, args: &[Value], many: bool) -> DriverResult<Value> {
        let filter = to_document(arg(args, 0))?;
        let mut session = self.state.session.borrow_mut();
        let result = match (session.as_mut(), many) {
            (Some(session), false) => self.coll.delete_one_with_session(filter, None, session),
            (Some(session), true) => self.coll.delete_many_with_session(filter, None, session),
            (None, false) => self.coll.delete_one(filter, None),
            (None, true) => self.coll.delete_many(filter, None),
        }
        .map_err(command_error)?;
        Ok(Record::new("DeleteResult")
            .field("deleted_count", count(result.deleted_count))
            .into())
    }
}

/// `{sort, projection, limit, skip}`; absent or `null` means defaults.
fn find_options(value: &Value) -> DriverResult<FindOptions> {
    let mut options = FindOptions::default();
    let Some(map) = options_map(value)? else {
        return Ok(options);
    };
    if let Some(sort) = map.get("sort") {
        options.sort = Some(to_document(sort)?);
    }
    if let Some(projection) = map.get("projection") {
        options.projection = Some(to_document(projection)?);
    }
    if let Some(limit) = map.get("limit") {
        options.limit = Some(integer_option("limit", limit)?);
    }
    if let Some(skip) = map.get("skip") {
        let skip = integer_option("skip", skip)?;
        options.skip =
            Some(u64::try_from(skip).map_err(|_| invalid_option("skip", "non-negative"))?);
    }
    Ok(options)
}

fn find_one_options(value: &Value) -> DriverResult<FindOneOptions> {
    let mut options = FindOneOptions::default();
    let Some(map) = options_map(value)? else {
        return Ok(options);
    };
    if let Some(sort) = map.get("sort") {
        options.sort = Some(to_document(sort)?);
    }
    if let Some(projection) = map.get("projection") {
        options.projection = Some(to_document(projection)?);
    }
    if let Some(skip) = map.get("skip") {
        let skip = integer_option("skip", skip)?;
        options.skip =
            Some(u64::try_from(skip).map_err(|_| invalid_option("skip", "non-negative"))?);
    }
    Ok(options)
}

fn options_map(value: &Value) -> DriverResult<Option<&std::collections::BTreeMap<String, Value>>> {
    match value {
        Value::Undefined | Value::Null => Ok(None),
        Value::Map(map) => Ok(Some(map)),
        other => Err(DriverError::Query(format!(
            "find options must be an object, got {}",
            other.kind()
        ))),
    }
}

fn integer_option(name: &str, value: &Value) -> DriverResult<i64> {
    value.as_i64().ok_or_else(|| invalid_option(name, "an integer"))
}

fn invalid_option(name: &str, expected: &str) -> DriverError {
    DriverError::Query(format!("find option '{name}' must be {expected}"))
}

#[cfg(test)]
#[path = "handle_test.rs"]
mod tests;
