use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use skylift::actions::builtin_registry;
use skylift::config::Config;
use skylift::engine::{ErrorCode, Namespace, Scheduler};
use skylift::plan::Plan;
use skylift::{slog, slog_warn, Result};

/// Skylift - cloud workload migration workflow engine
#[derive(Parser, Debug)]
#[command(name = "skylift")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    SKYLIFT_DEBUG=1     Enable debug logging (alternative to --debug)\n    SKYLIFT_LOG=LEVEL   Set the log level (error, warn, info, debug)"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.skylift/skylift.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a migration plan
    Run {
        /// Path to the plan file (TOML)
        plan: PathBuf,

        /// Fork parallel branches with a shallow namespace copy
        #[arg(long)]
        shallow_fork: bool,

        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a plan without executing it
    Validate {
        /// Path to the plan file (TOML)
        plan: PathBuf,
    },

    /// Create the skylift directories and a default config file
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    skylift::log::init_with_debug(cli.debug);

    let result = match cli.command {
        Command::Run {
            plan,
            shallow_fork,
            json,
        } => return run_plan(plan, shallow_fork, json),
        Command::Validate { plan } => validate_plan(plan),
        Command::Init => run_init(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Execute a plan and exit with the scheduler's terminal status.
///
/// Exit codes: 0 success, 1 preparation failed, 2 migration failed,
/// 3 rollback failed.
fn run_plan(path: PathBuf, shallow_fork: bool, json: bool) -> ExitCode {
    let code = match execute_plan(&path, shallow_fork, json) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    ExitCode::from(code.exit_code() as u8)
}

fn execute_plan(path: &PathBuf, shallow_fork: bool, json: bool) -> Result<ErrorCode> {
    slog!(
        "Run command: plan={}, shallow_fork={}",
        path.display(),
        shallow_fork
    );

    let config = Config::load()?;
    let plan = Plan::load(path)?;
    let chains = plan.build(&builtin_registry())?;

    let mut namespace = Namespace::new();
    namespace.set("source", serde_json::to_value(&config.source)?);
    namespace.set("destination", serde_json::to_value(&config.destination)?);
    namespace.set("copy_backend", json!(config.effective_copy_backend()));

    let rt = tokio::runtime::Runtime::new()?;
    let code = rt.block_on(async {
        let mut scheduler = Scheduler::new(
            namespace,
            chains.preparation,
            chains.migration,
            chains.rollback,
        );
        if shallow_fork {
            scheduler = scheduler.with_shallow_fork();
        }
        scheduler.start().await
    });

    slog!("Plan '{}' finished with {}", plan.name, code);
    if json {
        let output = json!({
            "plan": plan.name,
            "status": format!("{}", code),
            "exit_code": code.exit_code(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Plan '{}' finished: {}", plan.name, code);
    }
    Ok(code)
}

/// Load a plan and build all three chains without running anything.
fn validate_plan(path: PathBuf) -> Result<()> {
    slog!("Validate command: plan={}", path.display());

    let plan = Plan::load(&path)?;
    let chains = plan.build(&builtin_registry())?;

    println!("Plan '{}' is valid.", plan.name);
    for (phase, cursor) in [
        ("preparation", &chains.preparation),
        ("migration", &chains.migration),
        ("rollback", &chains.rollback),
    ] {
        match cursor.entry() {
            Some(task) => println!("  {}: entry '{}'", phase, task.name),
            None => println!("  {}: empty", phase),
        }
    }
    Ok(())
}

fn run_init() -> Result<()> {
    slog!("Init command");
    Config::ensure_dirs()?;
    let path = Config::config_path()?;
    if path.exists() {
        slog_warn!("Init skipped: config already exists at {}", path.display());
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    Config::default().save()?;
    println!("Created default config at {}", path.display());
    Ok(())
}
