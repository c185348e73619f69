//! End-to-end migration runs against the embedded backends.

use gv_core::{DatabaseConfig, DatabaseKind};
use gv_db::{connect_driver, Driver};
use gv_migrate::{MigrateError, Migrator, ALL};
use gv_script::Script;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const M1: &str = "20240101000000-create-users.migration.ts";
const M2: &str = "20240102000000-add-orders.migration.ts";
const M3: &str = "20240103000000-seed.migration.js";

struct Project {
    dir: TempDir,
    config: DatabaseConfig,
}

impl Project {
    fn new(kind: DatabaseKind) -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("migrations")).unwrap();
        let file = match kind {
            DatabaseKind::DuckDb => "app.duckdb",
            _ => "app.db",
        };
        let config = DatabaseConfig {
            name: "main".to_string(),
            kind,
            connection_url: dir.path().join(file).display().to_string(),
            database_name: None,
            migrations_path: "migrations".to_string(),
            metadata_table: None,
            script_extensions: vec!["ts".to_string(), "js".to_string()],
        };
        Self { dir, config }
    }

    fn write(&self, filename: &str, content: &str) {
        fs::write(self.dir.path().join("migrations").join(filename), content).unwrap();
    }

    fn remove(&self, filename: &str) {
        fs::remove_file(self.dir.path().join("migrations").join(filename)).unwrap();
    }

    fn connect(&self) -> Box<dyn Driver> {
        connect_driver(&self.config).unwrap()
    }

    fn standard(&self) {
        self.write(
            M1,
            "export function up(db: Handle): void {\n  db.exec(sql`CREATE TABLE users (id INTEGER, name TEXT)`)\n}\n\
             export function down(db: Handle): void {\n  db.exec(sql`DROP TABLE users`)\n}\n",
        );
        self.write(
            M2,
            "export function up(db: Handle): void {\n  db.exec(sql`CREATE TABLE orders (id INTEGER)`)\n}\n\
             export function down(db: Handle): void {\n  db.exec(sql`DROP TABLE orders`)\n}\n",
        );
        self.write(
            M3,
            "export function up(db) { db.exec('INSERT INTO users VALUES (?, ?)', [1, 'Ada']) }\n\
             export function down(db) { db.exec('DELETE FROM users') }\n",
        );
    }
}

fn backends() -> Vec<Project> {
    vec![Project::new(DatabaseKind::Sqlite), Project::new(DatabaseKind::DuckDb)]
}

fn migrator<'a>(project: &Project, driver: &'a dyn Driver) -> Migrator<'a> {
    Migrator::for_config(driver, &project.config, project.dir.path())
}

fn applied(driver: &dyn Driver) -> Vec<String> {
    driver
        .applied_migrations()
        .unwrap()
        .into_iter()
        .map(|m| m.filename.into_inner())
        .collect()
}

/// True when `table` can be selected from.
fn table_exists(dir: &Path, driver: &dyn Driver, table: &str) -> bool {
    let path = dir.join(format!("20000101000000-check-{table}.migration.js"));
    fs::write(
        &path,
        format!("export function up(db) {{ db.query('SELECT * FROM {table}') }}\nexport function down() {{}}\n"),
    )
    .unwrap();
    Script::compile(&path).unwrap().up(driver).is_ok()
}

#[test]
fn test_up_applies_in_filename_order() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());

        let plan = migrator.plan_up(None).unwrap();
        assert_eq!(migrator.execute(&plan, |_| {}).unwrap(), 3);

        assert_eq!(applied(driver.as_ref()), vec![M1, M2, M3]);
        assert!(table_exists(project.dir.path(), driver.as_ref(), "users"));
        assert!(table_exists(project.dir.path(), driver.as_ref(), "orders"));
    }
}

#[test]
fn test_down_to_target_and_back_up() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());
        migrator.execute(&migrator.plan_up(None).unwrap(), |_| {}).unwrap();

        let plan = migrator.plan_down(Some("add-orders"), false).unwrap();
        let order: Vec<&str> = plan.migrations.iter().map(|m| m.name()).collect();
        assert_eq!(order, vec!["seed", "add-orders"]);
        migrator.execute(&plan, |_| {}).unwrap();

        assert_eq!(applied(driver.as_ref()), vec![M1]);
        assert!(!table_exists(project.dir.path(), driver.as_ref(), "orders"));

        migrator.execute(&migrator.plan_up(None).unwrap(), |_| {}).unwrap();
        assert_eq!(applied(driver.as_ref()), vec![M1, M2, M3]);
    }
}

#[test]
fn test_applied_set_survives_reconnect() {
    for project in backends() {
        project.standard();
        {
            let mut driver = project.connect();
            let migrator = migrator(&project, driver.as_ref());
            migrator.execute(&migrator.plan_up(Some("create-users")).unwrap(), |_| {}).unwrap();
            drop(migrator);
            driver.disconnect().unwrap();
        }

        let driver = project.connect();
        let status = migrator(&project, driver.as_ref()).status().unwrap();
        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.pending.len(), 2);
    }
}

#[test]
fn test_failing_step_rolls_back_and_keeps_earlier_steps() {
    for project in backends() {
        project.write(
            M1,
            "export function up(db) { db.exec('CREATE TABLE users (id INTEGER)') }\nexport function down(db) {}\n",
        );
        project.write(
            M2,
            "export function up(db) {\n  db.exec('CREATE TABLE orders (id INTEGER)')\n  throw new Error('orders exploded')\n}\nexport function down(db) {}\n",
        );
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());

        let err = migrator.execute(&migrator.plan_up(None).unwrap(), |_| {}).unwrap_err();
        match err {
            MigrateError::ScriptRuntime { filename, message } => {
                assert_eq!(filename, M2);
                assert!(message.contains("orders exploded"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(applied(driver.as_ref()), vec![M1]);
        assert!(table_exists(project.dir.path(), driver.as_ref(), "users"));
        assert!(!table_exists(project.dir.path(), driver.as_ref(), "orders"));
    }
}

#[test]
fn test_up_when_everything_is_applied() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());
        migrator.execute(&migrator.plan_up(None).unwrap(), |_| {}).unwrap();

        let plan = migrator.plan_up(None).unwrap();
        assert!(plan.is_empty());
        assert_eq!(migrator.execute(&plan, |_| {}).unwrap(), 0);
    }
}

#[test]
fn test_set_head_without_running_scripts() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());

        migrator.set_head("seed").unwrap();
        assert_eq!(applied(driver.as_ref()), vec![M1, M2, M3]);
        assert!(!table_exists(project.dir.path(), driver.as_ref(), "users"));

        migrator.set_head(ALL).unwrap();
        assert!(applied(driver.as_ref()).is_empty());
    }
}

#[test]
fn test_down_from_disk_needs_the_file() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());
        migrator.execute(&migrator.plan_up(None).unwrap(), |_| {}).unwrap();
        project.remove(M3);

        let err = migrator.plan_down(None, true).unwrap_err();
        assert!(matches!(err, MigrateError::MissingSource { ref filename, .. } if filename == M3));

        // the persisted source still works
        let plan = migrator.plan_down(None, false).unwrap();
        migrator.execute(&plan, |_| {}).unwrap();
        assert_eq!(applied(driver.as_ref()), vec![M1, M2]);
    }
}

#[test]
fn test_down_uses_persisted_source_by_default() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());
        migrator.execute(&migrator.plan_up(Some("add-orders")).unwrap(), |_| {}).unwrap();
        project.write(
            M2,
            "export function up(db) {}\nexport function down(db) { throw new Error('edited on disk') }\n",
        );

        migrator.execute(&migrator.plan_down(None, false).unwrap(), |_| {}).unwrap();
        assert_eq!(applied(driver.as_ref()), vec![M1]);
    }
}

#[test]
fn test_unknown_target() {
    for project in backends() {
        project.standard();
        let driver = project.connect();
        let migrator = migrator(&project, driver.as_ref());

        assert!(matches!(
            migrator.plan_up(Some("nope")),
            Err(MigrateError::NotFound { .. })
        ));
        assert!(matches!(
            migrator.set_head("nope"),
            Err(MigrateError::NotFound { .. })
        ));
    }
}

#[test]
fn test_empty_migrations_directory() {
    for project in backends() {
        let driver = project.connect();
        let status = migrator(&project, driver.as_ref()).status().unwrap();
        assert!(status.applied.is_empty());
        assert!(status.pending.is_empty());
    }
}
