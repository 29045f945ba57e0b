//! CLI struct definitions for the plangate command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "plangate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Validate untrusted task plans and execute them as scoped, parameterized storage operations."
)]
pub(crate) struct Cli {
    /// Working directory holding plangate.toml and the task database.
    #[clap(long, global = true)]
    pub root: Option<PathBuf>,
    /// Config file (defaults to <root>/plangate.toml).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
pub(crate) struct InitCli {
    /// Rewrite plangate.toml with defaults even if it exists.
    #[clap(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ExecCli {
    /// Authenticated user id. Every storage operation is scoped to it.
    #[clap(long)]
    pub user: String,
    /// Session whose ordinal references ("the second one") persist between calls.
    #[clap(long, default_value = "default")]
    pub session: String,
    /// Plan JSON file, or '-' for stdin.
    #[clap(long, default_value = "-")]
    pub plan: String,
    /// JSON array of prior conversation turns ({role, content}).
    #[clap(long)]
    pub history: Option<PathBuf>,
    /// Planner command for interactive plans. Receives one JSON request on
    /// stdin per round trip and answers with one JSON reply.
    #[clap(long)]
    pub planner_cmd: Option<String>,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ValidateCli {
    /// Plan JSON file, or '-' for stdin.
    #[clap(long, default_value = "-")]
    pub plan: String,
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct FiltersCli {
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Write a default plangate.toml and create the task database
    Init(InitCli),
    /// Validate and execute one plan for a user
    Exec(ExecCli),
    /// Validate a plan without touching storage
    Validate(ValidateCli),
    /// List the registered filters
    Filters(FiltersCli),
}
