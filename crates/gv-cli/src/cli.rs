//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand};

/// Graviton - database migrations written in JavaScript and TypeScript
#[derive(Parser, Debug)]
#[command(name = "graviton")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to graviton.yml (default: search upwards from the working directory)
    #[arg(short, long, global = true, env = "GRAVITON_CONFIG")]
    pub config: Option<String>,

    /// Only operate on the named database
    #[arg(short, long, global = true)]
    pub database: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up(UpArgs),

    /// Roll back applied migrations
    Down(DownArgs),

    /// Show applied and pending migrations
    Status,

    /// Mark migrations as applied through a target without running them
    SetHead(SetHeadArgs),
}

/// Arguments for the up command
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Last migration to apply, by name or filename (default: all pending)
    pub target: Option<String>,
}

/// Arguments for the down command
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Last migration to roll back, by name or filename, or `-` for all
    /// (default: the most recent)
    pub target: Option<String>,

    /// Run `down` from the files on disk instead of the stored source
    #[arg(long)]
    pub from_disk: bool,
}

/// Arguments for the set-head command
#[derive(Args, Debug)]
pub struct SetHeadArgs {
    /// New last applied migration, by name or filename, or `-` for none
    pub target: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
