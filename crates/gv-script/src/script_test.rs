use super::*;
use gv_core::value::Record;
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingHost {
    seen: Rc<RefCell<Vec<Value>>>,
    globals: Vec<(String, Value)>,
    prelude: Option<String>,
}

impl RecordingHost {
    fn seen(&self) -> Vec<Value> {
        self.seen.borrow().clone()
    }
}

impl ScriptHost for RecordingHost {
    fn handle(&self) -> Value {
        let seen = self.seen.clone();
        Value::Record(
            Record::new("Handle")
                .field("A", 1i64)
                .field("B", "x")
                .method("record", move |args| {
                    seen.borrow_mut().extend(args.iter().cloned());
                    Ok(vec![])
                }),
        )
    }

    fn globals(&self) -> Vec<(String, Value)> {
        self.globals.clone()
    }

    fn prelude(&self) -> Option<&str> {
        self.prelude.as_deref()
    }
}

fn write_script(dir: &TempDir, filename: &str, content: &str) -> Script {
    let path = dir.path().join(filename);
    fs::write(&path, content).unwrap();
    Script::compile(&path).unwrap()
}

#[test]
fn test_up_and_down_receive_handle() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-init.migration.js",
        "export function up(db) { db.record('up'); }\n\
         export function down(db) { db.record('down'); }\n",
    );
    let host = RecordingHost::default();

    script.up(&host).unwrap();
    script.down(&host).unwrap();

    assert_eq!(host.seen(), vec![Value::from("up"), Value::from("down")]);
}

#[test]
fn test_handle_record_fields_are_lower_camel() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-fields.migration.js",
        "export function up(db) { db.record(JSON.stringify({ a: db.a, b: db.b })); }\n\
         export function down() {}\n",
    );
    let host = RecordingHost::default();

    script.up(&host).unwrap();

    assert_eq!(host.seen(), vec![Value::from(r#"{"a":1,"b":"x"}"#)]);
}

#[test]
fn test_typescript_migration() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-typed.migration.ts",
        "interface Handle { record(value: unknown): void }\n\
         export function up(db: Handle): void {\n\
           const rows: number[] = [1, 2, 3];\n\
           db.record(rows);\n\
         }\n\
         export function down(db: Handle): void {}\n",
    );
    let host = RecordingHost::default();

    script.up(&host).unwrap();

    assert_eq!(
        host.seen(),
        vec![Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)])]
    );
}

#[test]
fn test_typescript_generics_and_catch_annotations() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-generic.migration.ts",
        "function id<T>(x: T): T[] { return [x] }\n\
         const wrap = <T,>(x: T): T => x\n\
         export function up(db: any): void {\n\
           try { throw new Error('caught') } catch (e: unknown) { db.record((e as Error).message) }\n\
           db.record(id(wrap(7)));\n\
         }\n\
         export function down(db: any): void {}\n",
    );
    let host = RecordingHost::default();

    script.up(&host).unwrap();

    assert_eq!(
        host.seen(),
        vec![Value::from("caught"), Value::Seq(vec![Value::Int(7)])]
    );
}

#[test]
fn test_default_export_and_declared_name() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-seed.migration.js",
        "export default {\n\
           name: 'seed',\n\
           up(db) { db.record('seeded'); },\n\
           down(db) {},\n\
         };\n",
    );
    let host = RecordingHost::default();

    assert_eq!(script.name(), "seed");
    assert_eq!(script.declared_name(&host).unwrap(), Some("seed".to_string()));
    script.up(&host).unwrap();
    assert_eq!(host.seen(), vec![Value::from("seeded")]);
}

#[test]
fn test_declared_name_absent() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-plain.migration.js",
        "export function up() {}\nexport function down() {}\n",
    );
    assert_eq!(script.declared_name(&RecordingHost::default()).unwrap(), None);
}

#[test]
fn test_missing_down_export() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-oneway.migration.js",
        "export function up() {}\n",
    );

    let err = script.down(&RecordingHost::default()).unwrap_err();
    assert!(matches!(err, ScriptError::MissingExport { ref export, .. } if export == "down"));
}

#[test]
fn test_thrown_error_is_runtime_error() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-broken.migration.js",
        "export function up() { throw new Error('boom'); }\nexport function down() {}\n",
    );

    let err = script.up(&RecordingHost::default()).unwrap_err();
    match err {
        ScriptError::Runtime { origin, message } => {
            assert_eq!(origin, "20240101000000-broken.migration.js");
            assert!(message.contains("boom"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_async_up_is_rejected() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-async.migration.js",
        "export async function up() {}\nexport function down() {}\n",
    );

    let err = script.up(&RecordingHost::default()).unwrap_err();
    assert!(matches!(err, ScriptError::Asynchronous { .. }));
}

#[test]
fn test_each_call_gets_a_fresh_interpreter() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-counter.migration.js",
        "let counter = 0;\n\
         export function up(db) { counter += 1; db.record(counter); }\n\
         export function down() {}\n",
    );
    let host = RecordingHost::default();

    script.up(&host).unwrap();
    script.up(&host).unwrap();

    assert_eq!(host.seen(), vec![Value::Int(1), Value::Int(1)]);
}

#[test]
fn test_globals_and_prelude() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-globals.migration.js",
        "export function up(db) { db.record(shout(greeting)); }\nexport function down() {}\n",
    );
    let host = RecordingHost {
        globals: vec![("greeting".to_string(), Value::from("hi"))],
        prelude: Some("globalThis.shout = (s) => s.toUpperCase() + '!';".to_string()),
        ..Default::default()
    };

    script.up(&host).unwrap();

    assert_eq!(host.seen(), vec![Value::from("HI!")]);
}

#[test]
fn test_console_is_available() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "20240101000000-chatty.migration.js",
        "export function up(db) { console.log('applying', { step: 1 }); console.warn('careful'); }\n\
         export function down() {}\n",
    );

    script.up(&RecordingHost::default()).unwrap();
}

#[test]
fn test_from_source_runs_stored_bundle() {
    let dir = TempDir::new().unwrap();
    let compiled = write_script(
        &dir,
        "20240101000000-stored.migration.js",
        "export function up() {}\nexport function down(db) { db.record('undone'); }\n",
    );
    let restored = Script::from_source(compiled.origin(), compiled.source());
    let host = RecordingHost::default();

    restored.down(&host).unwrap();

    assert_eq!(restored, compiled);
    assert_eq!(host.seen(), vec![Value::from("undone")]);
}

#[test]
fn test_name_falls_back_for_irregular_origin() {
    let script = Script::from_source("scratch.js", "var migration = {};");
    assert_eq!(script.name(), "scratch");
}
