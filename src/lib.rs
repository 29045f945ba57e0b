//! plangate: a trust boundary between language-model plans and task storage.
//!
//! A spoken request such as "mark the second one done" reaches this crate as
//! a structured, untrusted plan. plangate validates it against a closed
//! schema and a filter whitelist, composes parameterized, user-scoped SQL,
//! and executes the steps in one of three tiers.
//!
//! # Tiers
//!
//! - **simple**: exactly one step.
//! - **multi_step**: steps run in order; the first failure halts the rest and
//!   earlier writes stand.
//! - **interactive**: after each step an external planner proposes the next
//!   one, bounded by a step ceiling and a wall-clock budget.
//!
//! # Guarantees
//!
//! - A rejected plan never reaches storage.
//! - Plan text never becomes SQL text. Filters map to typed predicates and
//!   every value is a bound parameter.
//! - The user scope comes from the caller and is the first conjunct of every
//!   query.
//!
//! # Examples
//!
//! ```bash
//! plangate init
//! echo '{"complexity":"simple","steps":[{"operation":"read"}]}' \
//!   | plangate exec --user alice
//! plangate filters
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: storage, broker, config, logging and traces
//! - [`engine`]: validator, filters, query builder, handlers, coordinator

mod cli;
pub mod core;
pub mod engine;

use crate::cli::{Cli, Command, ExecCli, FiltersCli, InitCli, OutputFormat, ValidateCli};
use crate::core::config::{self, Config};
use crate::core::error::PlanGateError;
use crate::core::logging;
use crate::core::store::{TaskStore, UserScope};
use crate::core::time::SystemClock;
use crate::core::todo::SqliteTaskStore;
use crate::engine::coordinator::{ExecutionCoordinator, RunOptions};
use crate::engine::filters::FilterRegistry;
use crate::engine::planner::{CommandPlanner, ConversationTurn, InteractivePlanner, NoFollowUp};
use crate::engine::session::SessionStore;
use crate::engine::specification::ExecutionResult;
use crate::engine::validator::PlanValidator;
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Parses the command line, runs it and returns the process exit code.
pub fn run() -> Result<i32, PlanGateError> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config_path = cli
        .config
        .unwrap_or_else(|| root.join(config::CONFIG_FILE_NAME));

    match cli.command {
        Command::Init(args) => run_init(&root, &config_path, &args),
        Command::Exec(args) => run_exec(&root, &config_path, &args),
        Command::Validate(args) => run_validate(&args),
        Command::Filters(args) => run_filters(&args),
    }
}

fn load_config(root: &Path, config_path: &Path) -> Result<Config, PlanGateError> {
    let mut config = Config::load(config_path)?;
    config.resolve_paths(root);
    logging::init_tracing(&config.logging);
    Ok(config)
}

fn read_input(source: &str) -> Result<String, PlanGateError> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(source)?)
    }
}

fn run_init(root: &Path, config_path: &Path, args: &InitCli) -> Result<i32, PlanGateError> {
    fs::create_dir_all(root)?;
    if args.force || !config_path.exists() {
        fs::write(config_path, Config::default().to_toml()?)?;
    }
    let config = load_config(root, config_path)?;
    let store = SqliteTaskStore::open(
        &config.store.path,
        config.store.audit_log.clone(),
        Arc::new(SystemClock),
    )?;
    println!("{} {}", "config".bright_cyan().bold(), config_path.display());
    println!("{} {}", "store ".bright_cyan().bold(), store.db_path().display());
    Ok(0)
}

fn run_exec(root: &Path, config_path: &Path, args: &ExecCli) -> Result<i32, PlanGateError> {
    let config = load_config(root, config_path)?;
    let user = UserScope::new(args.user.clone())?;

    // Unparseable input still goes through the validator so it is rejected
    // and traced like any other bad plan.
    let raw: Value = serde_json::from_str(&read_input(&args.plan)?).unwrap_or(Value::Null);

    let history: Vec<ConversationTurn> = match &args.history {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    let command_planner = args
        .planner_cmd
        .as_deref()
        .map(CommandPlanner::parse)
        .transpose()?;
    let planner: &dyn InteractivePlanner = match &command_planner {
        Some(p) => p,
        None => &NoFollowUp,
    };

    let store = Arc::new(SqliteTaskStore::open(
        &config.store.path,
        config.store.audit_log.clone(),
        Arc::new(SystemClock),
    )?);
    let mut session = store.load_session(&user, &args.session)?;
    let task_store: Arc<dyn TaskStore> = store.clone();
    let coordinator = ExecutionCoordinator::new(task_store, Arc::new(SystemClock), config.coordinator());

    let opts = RunOptions {
        history: &history,
        planner,
        cancel: None,
    };
    let result = coordinator.run_plan(&raw, &mut session, &opts);
    store.save_session(&session)?;

    print_result(&result, args.format)?;
    Ok(if result.success { 0 } else { 1 })
}

fn print_result(result: &ExecutionResult, format: OutputFormat) -> Result<(), PlanGateError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let status = match result.error {
                None => "✓ done".bright_green().bold(),
                Some(kind) => format!("✗ {kind}").bright_red().bold(),
            };
            println!(
                "{} {}",
                status,
                format!(
                    "({} step(s), {} ms)",
                    result.steps_executed, result.latency_ms
                )
                .dimmed()
            );
            println!("{}", result.natural_response);
        }
    }
    Ok(())
}

fn run_validate(args: &ValidateCli) -> Result<i32, PlanGateError> {
    let text = read_input(&args.plan)?;
    let outcome = PlanValidator::new().validate_str(&text);
    match (args.format, &outcome) {
        (OutputFormat::Json, Ok(spec)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({"valid": true, "specification": spec}))?
            );
        }
        (OutputFormat::Json, Err(err)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "valid": false,
                    "error": err.kind(),
                    "detail": err.to_string(),
                }))?
            );
        }
        (OutputFormat::Text, Ok(spec)) => {
            println!(
                "{} {:?} plan with {} step(s)",
                "✓ valid".bright_green().bold(),
                spec.complexity,
                spec.steps.len()
            );
        }
        (OutputFormat::Text, Err(err)) => {
            println!("{} {}", format!("✗ {}", err.kind()).bright_red().bold(), err);
        }
    }
    Ok(if outcome.is_ok() { 0 } else { 1 })
}

fn run_filters(args: &FiltersCli) -> Result<i32, PlanGateError> {
    let entries = FilterRegistry::global().entries();
    match args.format {
        OutputFormat::Json => {
            let rows: Vec<Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "name": e.name,
                        "arg": e.arg.describe(),
                        "description": e.description,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            for e in entries {
                println!(
                    "{} {} {}",
                    format!("{:<18}", e.name).bright_cyan(),
                    format!("{:<36}", e.arg.describe()).dimmed(),
                    e.description
                );
            }
        }
    }
    Ok(0)
}
