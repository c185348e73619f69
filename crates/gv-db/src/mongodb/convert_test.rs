use super::*;
use crate::mongodb::MongoDriver;
use chrono::TimeZone;
use gv_core::value::Record;
use gv_core::{DatabaseConfig, DatabaseKind};
use gv_script::{Script, ScriptHost};
use mongodb::bson::doc;
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;

const HEX: &str = "65b8077faddfba1bb64fa9fe";

#[test]
fn test_document_round_trip() {
    let id = ObjectId::parse_str(HEX).unwrap();
    let value = Value::map([
        ("_id", object_id_value(id)),
        ("name", Value::from("one")),
        (
            "metaInfo",
            Value::map([
                ("size", Value::Int(42)),
                ("tags", Value::Seq(vec![Value::from("foo"), Value::from("bar")])),
            ]),
        ),
        ("addedAt", date_value(BsonDateTime::from_millis(1_700_000_000_000))),
        ("ratio", Value::Float(0.5)),
        ("skipped", Value::Undefined),
    ]);

    let doc = to_document(&value).unwrap();
    assert_eq!(doc.get_object_id("_id").unwrap(), id);
    assert_eq!(doc.get_document("metaInfo").unwrap().get_i64("size").unwrap(), 42);
    assert_eq!(
        doc.get_datetime("addedAt").unwrap().timestamp_millis(),
        1_700_000_000_000
    );
    assert!(!doc.contains_key("skipped"));

    let Value::Map(back) = from_document(doc) else {
        panic!("expected a map");
    };
    assert_eq!(back["_id"].as_extension::<ObjectId>(), Some(&id));
    assert_eq!(back["name"], Value::from("one"));
    assert_eq!(back["ratio"], Value::Float(0.5));
    assert_eq!(
        back["metaInfo"].as_map().unwrap()["tags"],
        Value::Seq(vec![Value::from("foo"), Value::from("bar")])
    );
}

#[test]
fn test_from_bson_numbers_and_extended_types() {
    assert_eq!(from_bson(Bson::Int32(7)), Value::Int(7));
    assert_eq!(from_bson(Bson::Null), Value::Null);
    assert_eq!(
        from_bson(Bson::JavaScriptCode("return 1".to_string())),
        Value::map([("$code", Value::from("return 1"))])
    );
}

#[test]
fn test_to_document_rejects_non_objects() {
    assert!(to_document(&Value::Null).unwrap().is_empty());
    assert!(matches!(
        to_document(&Value::from("x")),
        Err(DriverError::Query(_))
    ));
    assert!(matches!(
        to_bson(&Value::Record(Record::new("Handle"))),
        Err(DriverError::Query(_))
    ));
}

#[test]
fn test_object_id_hex_host_function() {
    let func = object_id_hex();

    let generated = func.call(&[]).unwrap();
    let Value::String(hex) = &generated[0] else {
        panic!("expected a string");
    };
    assert!(ObjectId::parse_str(hex).is_ok());

    assert_eq!(
        func.call(&[Value::from(HEX)]).unwrap(),
        vec![Value::from(HEX)]
    );
    let err = func.call(&[Value::from("nope")]).unwrap_err();
    assert!(err.message().contains("invalid ObjectId"), "{err}");
}

/// Exposes the MongoDB globals and recognizers with a recording handle.
struct Recorder {
    driver: MongoDriver,
    seen: Rc<RefCell<Vec<Value>>>,
}

impl Recorder {
    fn new() -> Self {
        let config = DatabaseConfig {
            name: "docs".to_string(),
            kind: DatabaseKind::MongoDb,
            connection_url: "mongodb://localhost:27017".to_string(),
            database_name: Some("app".to_string()),
            migrations_path: "migrations".to_string(),
            metadata_table: None,
            script_extensions: vec!["ts".to_string()],
        };
        Self {
            driver: MongoDriver::new(&config),
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl ScriptHost for Recorder {
    fn handle(&self) -> Value {
        let seen = self.seen.clone();
        Record::new("Recorder")
            .method("keep", move |args| {
                seen.borrow_mut().extend(args.iter().cloned());
                Ok(vec![])
            })
            .method("stored", |_| {
                Ok(vec![
                    object_id_value(ObjectId::parse_str(HEX).unwrap()),
                    date_value(BsonDateTime::from_millis(1_700_000_000_000)),
                ])
            })
            .into()
    }

    fn globals(&self) -> Vec<(String, Value)> {
        self.driver.globals()
    }

    fn prelude(&self) -> Option<&str> {
        self.driver.prelude()
    }

    fn recognizers(&self) -> Vec<Rc<dyn ValueRecognizer>> {
        self.driver.recognizers()
    }
}

fn script(dir: &TempDir, body: &str) -> Script {
    let path = dir.path().join("20240101000000-recorder.migration.ts");
    std::fs::write(&path, format!("{body}\nexport function down() {{}}\n")).unwrap();
    Script::compile(&path).unwrap()
}

#[test]
fn test_object_ids_and_dates_cross_the_bridge() {
    let dir = TempDir::new().unwrap();
    let recorder = Recorder::new();
    let script = script(
        &dir,
        r#"
export function up(recorder: Recorder) {
  const id = new ObjectId('65b8077faddfba1bb64fa9fe')
  recorder.keep(id, new Date(Date.UTC(2024, 0, 2)), { _id: new ObjectId(), tags: ['a'] })

  const [storedId, storedAt] = recorder.stored()
  if (!(storedId instanceof ObjectId) || !storedId.equals(id)) {
    throw new Error('expected an ObjectId, got ' + storedId)
  }
  if (!(storedAt instanceof Date) || storedAt.getTime() !== 1700000000000) {
    throw new Error('expected a Date, got ' + storedAt)
  }
}
"#,
    );

    script.up(&recorder).unwrap();

    let seen = recorder.seen.borrow();
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen[0].as_extension::<ObjectId>(),
        Some(&ObjectId::parse_str(HEX).unwrap())
    );
    let date = seen[1].as_extension::<BsonDateTime>().unwrap();
    assert_eq!(
        date.timestamp_millis(),
        chrono::Utc
            .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
            .unwrap()
            .timestamp_millis()
    );
    let doc = to_document(&seen[2]).unwrap();
    let generated = doc.get_object_id("_id").unwrap();
    assert_eq!(doc, doc! { "_id": generated, "tags": ["a"] });
}

#[test]
fn test_invalid_object_id_throws_in_script() {
    let dir = TempDir::new().unwrap();
    let script = script(
        &dir,
        "export function up() { new ObjectId('not-hex') }",
    );

    let err = script.up(&Recorder::new()).unwrap_err();
    assert!(err.to_string().contains("invalid ObjectId"), "{err}");
}
