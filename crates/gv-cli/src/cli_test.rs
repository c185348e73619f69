use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_global_args_after_subcommand() {
    let cli = Cli::try_parse_from(["graviton", "up", "init", "-d", "app", "-v"]).unwrap();
    assert!(cli.global.verbose);
    assert_eq!(cli.global.database.as_deref(), Some("app"));
    match cli.command {
        Commands::Up(args) => assert_eq!(args.target.as_deref(), Some("init")),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_down_all_from_disk() {
    let cli = Cli::try_parse_from(["graviton", "down", "-", "--from-disk"]).unwrap();
    match cli.command {
        Commands::Down(args) => {
            assert_eq!(args.target.as_deref(), Some("-"));
            assert!(args.from_disk);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_set_head_requires_target() {
    assert!(Cli::try_parse_from(["graviton", "set-head"]).is_err());
}
