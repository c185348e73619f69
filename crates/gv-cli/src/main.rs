//! Graviton CLI - database migrations written in JavaScript and TypeScript

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::common::ExitCode;
use commands::{down, set_head, status, up};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(err) = run(&cli) {
        let code = match err.downcast_ref::<ExitCode>() {
            Some(ec) => ec.0,
            None => {
                eprintln!("Error: {err:#}");
                1
            }
        };
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Up(args) => up::execute(args, &cli.global),
        Commands::Down(args) => down::execute(args, &cli.global),
        Commands::Status => status::execute(&cli.global),
        Commands::SetHead(args) => set_head::execute(args, &cli.global),
    }
}

/// `RUST_LOG` wins; otherwise `-v` selects debug and the default is info.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
