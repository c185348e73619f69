//! End-to-end tests for the `graviton` binary against SQLite projects.

use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Path to the compiled graviton binary
fn graviton_bin() -> String {
    env!("CARGO_BIN_EXE_graviton").to_string()
}

/// Run `graviton` in `dir` and return (stdout, stderr, success).
fn run_graviton(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(graviton_bin())
        .current_dir(dir)
        .env_remove("GRAVITON_CONFIG")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to execute graviton with args {:?}: {}", args, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = format!(
        "databases:\n  - name: app\n    kind: sqlite\n    connection_url: '{}'\n",
        dir.path().join("app.db").display()
    );
    fs::write(dir.path().join("graviton.yml"), config).unwrap();
    let migrations = dir.path().join("migrations");
    fs::create_dir(&migrations).unwrap();
    fs::write(
        migrations.join("20240101000000-init.migration.ts"),
        "export function up(db: Handle) {\n  db.exec(sql`CREATE TABLE users (id INTEGER)`)\n}\n\
         export function down(db: Handle) {\n  db.exec(sql`DROP TABLE users`)\n}\n",
    )
    .unwrap();
    fs::write(
        migrations.join("20240102000000-seed.migration.js"),
        "export function up(db) { db.exec('INSERT INTO users VALUES (1)') }\n\
         export function down(db) { db.exec('DELETE FROM users') }\n",
    )
    .unwrap();
    dir
}

#[test]
fn test_up_then_status() {
    let dir = project();

    let (stdout, stderr, ok) = run_graviton(dir.path(), &["up"]);
    assert!(ok, "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("20240101000000-init.migration.ts"), "{stdout}");
    assert!(stdout.contains("Applied 2 migrations"), "{stdout}");

    let (stdout, _, ok) = run_graviton(dir.path(), &["status"]);
    assert!(ok);
    let pending = stdout.split("Pending:").nth(1).unwrap();
    assert!(pending.contains("(none)"), "{stdout}");
}

#[test]
fn test_down_rolls_back_most_recent() {
    let dir = project();
    assert!(run_graviton(dir.path(), &["up"]).2);

    let (stdout, stderr, ok) = run_graviton(dir.path(), &["down"]);
    assert!(ok, "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("20240102000000-seed.migration.js"), "{stdout}");
    assert!(!stdout.contains("20240101000000-init"), "{stdout}");
    assert!(stdout.contains("Rolled back 1 migration\n"), "{stdout}");
}

#[test]
fn test_set_head_from_subdirectory() {
    let dir = project();
    let nested = dir.path().join("migrations");

    let (stdout, stderr, ok) = run_graviton(&nested, &["set-head", "init"]);
    assert!(ok, "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("Marked 1 migration as applied"), "{stdout}");
}

#[test]
fn test_failure_exits_non_zero() {
    let dir = project();
    fs::write(
        dir.path().join("migrations/20240103000000-broken.migration.js"),
        "export function up(db) { throw new Error('boom') }\nexport function down(db) {}\n",
    )
    .unwrap();

    let (stdout, stderr, ok) = run_graviton(dir.path(), &["up"]);
    assert!(!ok);
    assert!(stdout.contains("ok  20240102000000-seed.migration.js"), "{stdout}");
    assert!(stderr.contains("boom"), "{stderr}");
}

#[test]
fn test_unknown_database() {
    let dir = project();
    let (_, stderr, ok) = run_graviton(dir.path(), &["status", "--database", "other"]);
    assert!(!ok);
    assert!(stderr.contains("other"), "{stderr}");
}

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("absent.yml");
    let (_, stderr, ok) = run_graviton(dir.path(), &["status", "--config", config.to_str().unwrap()]);
    assert!(!ok);
    assert!(stderr.contains("absent.yml"), "{stderr}");
}
