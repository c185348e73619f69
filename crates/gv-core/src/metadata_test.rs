use super::*;
use chrono::TimeZone;

fn filename(s: &str) -> MigrationFilename {
    MigrationFilename::parse(s).unwrap()
}

#[test]
fn test_new_truncates_to_millis() {
    let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
    let meta = MigrationMetadata::new(filename("20240101000000-init.migration.js"), "src", ts);
    assert_eq!(meta.applied_at.timestamp_subsec_nanos(), 123_000_000);
    assert_eq!(meta.applied_at.timestamp(), 1_700_000_000);
}

#[test]
fn test_name_derived_from_filename() {
    let meta = MigrationMetadata::new(
        filename("20240101000000-create_users.migration.js"),
        "",
        now_millis(),
    );
    assert_eq!(meta.name(), "create_users");
}

#[test]
fn test_sort_by_filename() {
    let ts = now_millis();
    let mut records = vec![
        MigrationMetadata::new(filename("20240101000002-c.migration.js"), "", ts),
        MigrationMetadata::new(filename("20240101000000-a.migration.js"), "", ts),
        MigrationMetadata::new(filename("20240101000001-b.migration.js"), "", ts),
    ];
    sort_by_filename(&mut records);
    let names: Vec<&str> = records.iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_serde_round_trip_keeps_millis() {
    let meta = MigrationMetadata::new(
        filename("20240101000000-init.migration.js"),
        "var migration = {};",
        now_millis(),
    );
    let json = serde_json::to_string(&meta).unwrap();
    let back: MigrationMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(meta, back);
}
