use super::*;
use chrono::{TimeZone, Utc};
use gv_core::MigrationFilename;
use gv_script::Script;

fn pending(filename: &str) -> Migration {
    Migration::pending(
        MigrationFilename::parse(filename).unwrap(),
        Script::from_source(filename, ""),
    )
}

fn applied(filename: &str) -> Migration {
    Migration {
        applied_at: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
        ..pending(filename)
    }
}

fn names(migrations: &[Migration]) -> Vec<&str> {
    migrations.iter().map(Migration::name).collect()
}

fn three(make: fn(&str) -> Migration) -> Vec<Migration> {
    vec![
        make("20240101000000-m1.migration.ts"),
        make("20240102000000-m2.migration.ts"),
        make("20240103000000-m3.migration.ts"),
    ]
}

#[test]
fn test_up_without_target_selects_all_pending() {
    let selected = select_up(three(pending), None).unwrap();
    assert_eq!(names(&selected), vec!["m1", "m2", "m3"]);
}

#[test]
fn test_up_stops_at_target_by_name_or_filename() {
    let selected = select_up(three(pending), Some("m2")).unwrap();
    assert_eq!(names(&selected), vec!["m1", "m2"]);

    let selected = select_up(three(pending), Some("20240101000000-m1.migration.ts")).unwrap();
    assert_eq!(names(&selected), vec!["m1"]);
}

#[test]
fn test_up_unknown_target() {
    let err = select_up(three(pending), Some("m9")).unwrap_err();
    assert!(matches!(err, MigrateError::NotFound { ref target } if target == "m9"));
}

#[test]
fn test_up_on_empty_pending_set() {
    assert!(select_up(Vec::new(), None).unwrap().is_empty());
}

#[test]
fn test_down_without_target_selects_most_recent() {
    let selected = select_down(three(applied), None).unwrap();
    assert_eq!(names(&selected), vec!["m3"]);
}

#[test]
fn test_down_to_target_runs_in_reverse() {
    let selected = select_down(three(applied), Some("m2")).unwrap();
    assert_eq!(names(&selected), vec!["m3", "m2"]);
}

#[test]
fn test_down_all() {
    let selected = select_down(three(applied), Some(ALL)).unwrap();
    assert_eq!(names(&selected), vec!["m3", "m2", "m1"]);
}

#[test]
fn test_down_unknown_target() {
    assert!(matches!(
        select_down(three(applied), Some("m0")),
        Err(MigrateError::NotFound { .. })
    ));
}

#[test]
fn test_down_on_empty_applied_set() {
    assert!(select_down(Vec::new(), None).unwrap().is_empty());
    assert!(select_down(Vec::new(), Some(ALL)).unwrap().is_empty());
}

#[test]
fn test_head_spans_applied_and_pending() {
    let mut all = three(applied);
    let pending_tail = all.split_off(1).into_iter().map(|m| Migration { applied_at: None, ..m });
    let head = select_head(all, pending_tail.collect(), "m2").unwrap();

    assert_eq!(names(&head), vec!["m1", "m2"]);
    assert!(head[0].is_applied());
    assert!(!head[1].is_applied());
}

#[test]
fn test_head_can_move_backwards() {
    let head = select_head(three(applied), Vec::new(), "m1").unwrap();
    assert_eq!(names(&head), vec!["m1"]);
}

#[test]
fn test_head_all_clears_the_set() {
    assert!(select_head(three(applied), three(pending), ALL).unwrap().is_empty());
}

#[test]
fn test_head_unknown_target() {
    assert!(matches!(
        select_head(Vec::new(), three(pending), "missing"),
        Err(MigrateError::NotFound { .. })
    ));
}

#[test]
fn test_direction_display() {
    assert_eq!(Direction::Up.to_string(), "up");
    assert_eq!(Direction::Down.to_string(), "down");
}
