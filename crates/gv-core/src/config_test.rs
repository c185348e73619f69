use super::*;
use std::collections::HashMap;

#[test]
fn test_parse_minimal_config() {
    let yaml = r#"
databases:
  - name: app
    kind: sqlite
    connection_url: ./app.db
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(config.databases.len(), 1);
    let db = &config.databases[0];
    assert_eq!(db.kind, DatabaseKind::Sqlite);
    assert_eq!(db.migrations_path, "migrations");
    assert_eq!(db.metadata_table(), DEFAULT_METADATA_TABLE);
    assert_eq!(db.script_extensions, vec!["ts", "js", "mjs"]);
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
databases:
  - name: docs
    kind: mongodb
    connection_url: mongodb://localhost:27017/?replicaSet=rs0
    database_name: docs
    migrations_path: db/mongo
  - name: warehouse
    kind: postgres
    connection_url: postgres://localhost/warehouse
    metadata_table: schema_history
    script_extensions: [js]
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    let docs = config.database("docs").unwrap();
    assert_eq!(docs.kind, DatabaseKind::MongoDb);
    assert_eq!(docs.metadata_table(), DEFAULT_METADATA_COLLECTION);
    assert_eq!(
        docs.migrations_dir(Path::new("/srv/project")),
        PathBuf::from("/srv/project/db/mongo")
    );

    let warehouse = config.database("warehouse").unwrap();
    assert_eq!(warehouse.kind, DatabaseKind::PostgreSql);
    assert_eq!(warehouse.metadata_table(), "schema_history");
}

#[test]
fn test_parse_mysql_kinds() {
    let yaml = r#"
databases:
  - name: shop
    kind: mysql
    connection_url: mysql://root@localhost:3306/shop
  - name: legacy
    kind: mariadb
    connection_url: mysql://root@localhost:3307/legacy
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    let shop = config.database("shop").unwrap();
    assert_eq!(shop.kind, DatabaseKind::MySql);
    assert!(shop.kind.is_relational());
    assert_eq!(shop.kind.to_string(), "mysql");
    assert_eq!(shop.metadata_table(), DEFAULT_METADATA_TABLE);
    assert_eq!(config.database("legacy").unwrap().kind, DatabaseKind::MySql);
}

#[test]
fn test_mongodb_requires_database_name() {
    let yaml = r#"
databases:
  - name: docs
    kind: mongodb
    connection_url: mongodb://localhost
"#;
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }), "{err}");
}

#[test]
fn test_rejects_duplicate_names() {
    let yaml = r#"
databases:
  - name: app
    kind: sqlite
    connection_url: a.db
  - name: app
    kind: duckdb
    connection_url: b.duckdb
"#;
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(err.to_string().contains("duplicate database name"));
}

#[test]
fn test_rejects_unsafe_metadata_table() {
    let yaml = r#"
databases:
  - name: app
    kind: sqlite
    connection_url: a.db
    metadata_table: "x; DROP TABLE y"
"#;
    assert!(Config::from_yaml_str(yaml).is_err());
}

#[test]
fn test_rejects_empty_database_list() {
    assert!(Config::from_yaml_str("databases: []").is_err());
}

#[test]
fn test_rejects_unknown_fields() {
    let yaml = r#"
databases:
  - name: app
    kind: sqlite
    connection_url: a.db
    colour: blue
"#;
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));
}

#[test]
fn test_interpolate_env() {
    let vars: HashMap<&str, &str> = [("DB_URL", "postgres://db"), ("USER", "me")].into();
    let out = interpolate_env("url: ${DB_URL}/${USER} keep: ${MISSING} $NOT", |name| {
        vars.get(name).map(|v| v.to_string())
    });
    assert_eq!(out, "url: postgres://db/me keep: ${MISSING} $NOT");
}

#[test]
fn test_select_databases() {
    let yaml = r#"
databases:
  - name: a
    kind: sqlite
    connection_url: a.db
  - name: b
    kind: duckdb
    connection_url: b.duckdb
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    let all: Vec<&str> = config
        .select_databases(None)
        .unwrap()
        .iter()
        .map(|db| db.name.as_str())
        .collect();
    assert_eq!(all, vec!["a", "b"]);
    assert_eq!(config.select_databases(Some("b")).unwrap()[0].name, "b");
    assert!(matches!(
        config.select_databases(Some("c")),
        Err(CoreError::DatabaseNotFound { .. })
    ));
}

#[test]
fn test_load_and_discover() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "databases:\n  - name: app\n    kind: sqlite\n    connection_url: app.db\n",
    )
    .unwrap();

    let found = Config::discover(&nested).unwrap();
    assert_eq!(found, dir.path().join(CONFIG_FILE_NAME));

    let config = Config::load(&found).unwrap();
    assert_eq!(config.root, dir.path());
    assert_eq!(
        config.databases[0].migrations_dir(&config.root),
        dir.path().join("migrations")
    );
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}
