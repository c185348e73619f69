//! `console` global for migration scripts, routed to the `log` facade.

use gv_core::value::{Record, Value};
use log::Level;

const METHODS: &[(&str, Level)] = &[
    ("log", Level::Info),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("debug", Level::Debug),
];

/// Build the console record for a script. Records are logged with target
/// `script::<origin>`.
pub fn console(origin: &str) -> Record {
    let target = format!("script::{origin}");
    METHODS.iter().fold(Record::new("Console"), |record, &(name, level)| {
        let target = target.clone();
        record.method(name, move |args| {
            log::log!(target: &target, level, "{}", format_line(args));
            Ok(vec![])
        })
    })
}

/// Join arguments the way `console.log` prints them.
pub fn format_line(args: &[Value]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let args = [
            Value::from("created"),
            Value::Int(3),
            Value::map([("table", Value::from("users"))]),
        ];
        assert_eq!(format_line(&args), "created 3 {table: users}");
        assert_eq!(format_line(&[]), "");
    }

    #[test]
    fn test_console_has_all_methods() {
        let record = console("20240101000000-init.migration.ts");
        let names: Vec<_> = record.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["log", "info", "warn", "error", "debug"]);
        for method in record.methods() {
            assert_eq!(method.call(&[Value::from("x")]), Ok(vec![]));
        }
    }
}
