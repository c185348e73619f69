use super::*;
use chrono::{TimeZone, Utc};
use gv_core::{DatabaseKind, MigrationFilename};
use gv_script::Script;
use tempfile::TempDir;

fn config(url: &str, database: Option<&str>, collection: Option<&str>) -> DatabaseConfig {
    DatabaseConfig {
        name: "docs".to_string(),
        kind: DatabaseKind::MongoDb,
        connection_url: url.to_string(),
        database_name: database.map(str::to_string),
        migrations_path: "migrations".to_string(),
        metadata_table: collection.map(str::to_string),
        script_extensions: vec!["ts".to_string()],
    }
}

fn replica_hello() -> Document {
    doc! { "isWritablePrimary": true, "secondary": false, "setName": "rs0" }
}

#[test]
fn test_check_server_accepts_replica_set_primary() {
    check_server(&doc! { "version": "7.0.4" }, &replica_hello()).unwrap();
}

#[test]
fn test_check_server_accepts_mongos() {
    let hello = doc! { "isWritablePrimary": true, "msg": "isdbgrid" };
    check_server(&doc! { "version": "6.0.0" }, &hello).unwrap();
}

#[test]
fn test_check_server_accepts_legacy_ismaster() {
    let hello = doc! { "ismaster": true, "setName": "rs0" };
    check_server(&doc! { "version": "4.0.28" }, &hello).unwrap();
}

#[test]
fn test_check_server_rejects_old_version() {
    let err = check_server(&doc! { "version": "3.6.23" }, &replica_hello()).unwrap_err();
    assert!(err.to_string().contains("at least 4.0"), "{err}");

    let err = check_server(&doc! {}, &replica_hello()).unwrap_err();
    assert!(matches!(err, DriverError::Connection(_)));
}

#[test]
fn test_check_server_rejects_secondary() {
    let hello = doc! { "isWritablePrimary": false, "secondary": true, "setName": "rs0" };
    let err = check_server(&doc! { "version": "7.0.4" }, &hello).unwrap_err();
    assert!(err.to_string().contains("secondary"), "{err}");
}

#[test]
fn test_check_server_rejects_standalone() {
    let hello = doc! { "isWritablePrimary": true };
    let err = check_server(&doc! { "version": "7.0.4" }, &hello).unwrap_err();
    assert!(err.to_string().contains("replica set"), "{err}");
}

#[test]
fn test_metadata_document_round_trip() {
    let migration = MigrationMetadata::new(
        MigrationFilename::parse("20231225010950-one.migration.ts").unwrap(),
        "var migration = {};",
        Utc.timestamp_millis_opt(1_703_466_590_123).unwrap(),
    );

    let doc = metadata_document(&migration);
    assert_eq!(doc.get_str("filename").unwrap(), "20231225010950-one.migration.ts");

    assert_eq!(metadata_from_document(&doc).unwrap(), migration);
}

#[test]
fn test_malformed_metadata_document() {
    let err = metadata_from_document(&doc! { "filename": "x" }).unwrap_err();
    assert!(matches!(err, DriverError::Persistence(_)));
}

#[test]
fn test_defaults_and_not_connected() {
    let driver = MongoDriver::new(&config("mongodb://localhost", Some("app"), None));
    assert_eq!(driver.kind(), "mongodb");
    assert_eq!(driver.collection, "graviton-migrations");
    assert_eq!(driver.handle(), Value::Null);
    assert!(matches!(
        driver.applied_migrations(),
        Err(DriverError::NotConnected)
    ));
}

/// Connects to the replica set at `GRAVITON_TEST_MONGODB_URL`; `None` when it is unset.
fn live_driver(collection: &str) -> Option<MongoDriver> {
    let url = std::env::var("GRAVITON_TEST_MONGODB_URL").ok()?;
    let mut driver = MongoDriver::new(&config(&url, Some("graviton_test"), Some(collection)));
    driver.connect().unwrap();
    Some(driver)
}

fn drop_collection(driver: &MongoDriver, name: &str) {
    let state = driver.state().unwrap();
    state
        .database
        .collection::<Document>(name)
        .drop(None)
        .unwrap();
}

fn compile(dir: &TempDir, source: &str) -> Script {
    let path = dir.path().join("20240101000000-docs.migration.ts");
    std::fs::write(&path, source).unwrap();
    Script::compile(&path).unwrap()
}

#[test]
fn test_live_applied_set_round_trip() {
    let collection = format!("graviton-meta-{}", std::process::id());
    let Some(driver) = live_driver(&collection) else {
        return;
    };
    let set = vec![
        MigrationMetadata::new(
            MigrationFilename::parse("20231225011003-three.migration.ts").unwrap(),
            "three",
            Utc.timestamp_millis_opt(2_000).unwrap(),
        ),
        MigrationMetadata::new(
            MigrationFilename::parse("20231225010950-one.migration.ts").unwrap(),
            "one",
            Utc.timestamp_millis_opt(1_000).unwrap(),
        ),
    ];

    driver.set_applied_migrations(&set).unwrap();
    let read = driver.applied_migrations().unwrap();
    driver.set_applied_migrations(&[]).unwrap();
    let emptied = driver.applied_migrations().unwrap();
    drop_collection(&driver, &collection);

    assert_eq!(read, vec![set[1].clone(), set[0].clone()]);
    assert!(emptied.is_empty());
}

#[test]
fn test_live_collection_operations() {
    let collection = format!("graviton-meta-{}-ops", std::process::id());
    let data = format!("graviton-data-{}", std::process::id());
    let Some(driver) = live_driver(&collection) else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let script = compile(
        &dir,
        &r#"
export function up(db: Handle) {
  const items = db.collection('DATA')
  const one = items.insertOne({ _id: new ObjectId('65b8077faddfba1bb64fa9fe'), name: 'one', addedAt: new Date(0) })
  if (one.insertedId.toHexString() !== '65b8077faddfba1bb64fa9fe') throw new Error('insertedId')
  const many = items.insertMany([{ name: 'two' }, { name: 'three' }])
  if (many.insertedIds.length !== 2) throw new Error('insertedIds')
  const updated = items.updateMany({ name: { $in: ['two', 'three'] } }, { $set: { seen: true } })
  if (updated.matchedCount !== 2 || updated.modifiedCount !== 2) throw new Error('update')
  const found = items.find({ seen: true }, { sort: { name: -1 } })
  if (found.length !== 2 || found[0].name !== 'two') throw new Error('find ' + JSON.stringify(found))
  const first = items.findOne({ name: 'one' })
  if (!(first.addedAt instanceof Date) || !(first._id instanceof ObjectId)) throw new Error('findOne')
  if (items.findOne({ name: 'missing' }) !== null) throw new Error('missing')
  const deleted = items.deleteMany({ seen: true })
  if (deleted.deletedCount !== 2) throw new Error('delete')
}
export function down(db: Handle) {
  db.collection('DATA').deleteOne({ name: 'one' })
}
"#
        .replace("DATA", &data),
    );

    driver.with_transaction(&mut || Ok(script.up(&driver)?)).unwrap();
    driver.with_transaction(&mut || Ok(script.down(&driver)?)).unwrap();

    let remaining = driver
        .state()
        .unwrap()
        .database
        .collection::<Document>(&data)
        .count_documents(None, None)
        .unwrap();
    drop_collection(&driver, &data);
    drop_collection(&driver, &collection);
    assert_eq!(remaining, 0);
}

#[test]
fn test_live_throwing_script_rolls_back() {
    let collection = format!("graviton-meta-{}-rb", std::process::id());
    let data = format!("graviton-rollback-{}", std::process::id());
    let Some(driver) = live_driver(&collection) else {
        return;
    };
    driver
        .state()
        .unwrap()
        .database
        .create_collection(&data, None)
        .unwrap();
    let dir = TempDir::new().unwrap();
    let script = compile(
        &dir,
        &r#"
export function up(db: Handle) {
  db.collection('DATA').insertOne({ name: 'written' })
  throw new Error('boom')
}
export function down() {}
"#
        .replace("DATA", &data),
    );

    let err = driver
        .with_transaction(&mut || Ok(script.up(&driver)?))
        .unwrap_err();
    let remaining = driver
        .state()
        .unwrap()
        .database
        .collection::<Document>(&data)
        .count_documents(None, None)
        .unwrap();
    drop_collection(&driver, &data);
    drop_collection(&driver, &collection);

    assert!(err.to_string().contains("boom"), "{err}");
    assert_eq!(remaining, 0);
}
