pub mod config;
pub mod errors;
pub mod executor;
pub mod git_config;
pub mod logging;
pub mod package_manager;
pub mod preflight;
pub mod prompt;
pub mod runtime;
pub mod setup;
pub mod shell;
pub mod types;
pub mod undo;
pub mod uninstall;

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_config, CliOverrides, EnvMap};
use errors::DevsetupError;
use logging::{append_run_log, init_run_logger};
use runtime::ProductionRuntime;
use serde_json::json;
use setup::run_setup;
use std::path::PathBuf;
use uninstall::run_uninstall;

#[derive(Debug, Clone, Parser)]
#[command(name = "devsetup", version)]
#[command(about = "Bootstrap a developer machine and undo what it changed")]
pub struct Cli {
    /// TOML config file (default: $XDG_CONFIG_HOME/devsetup/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding undo logs and the audit log.
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Install packages and apply git settings, recording how to undo each change.
    Setup {
        /// Apply every change without asking.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Report what would change and touch nothing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Replay an undo log recorded by `setup`.
    Uninstall {
        /// Undo log to replay; discovered in the state directory when omitted.
        log: Option<PathBuf>,
    },
}

pub fn run() -> Result<i32, DevsetupError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let env = std::env::vars_os().collect::<Vec<_>>();
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &env, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    env: &[(std::ffi::OsString, std::ffi::OsString)],
    runtime: &ProductionRuntime,
) -> Result<i32, DevsetupError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(DevsetupError::Cli(error.to_string())),
        },
    };

    let env_map = env_to_map(env);
    let (force, dry_run) = match &cli.command {
        Commands::Setup { force, dry_run } => (*force, *dry_run),
        Commands::Uninstall { .. } => (false, false),
    };
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        state_dir: cli.state_dir.clone(),
        force,
        dry_run,
    };
    let (cfg, scope) = load_config(&overrides, &env_map, runtime.file_system.as_ref())?;
    init_run_logger(&scope.audit_log);
    let command_name = match cli.command {
        Commands::Setup { .. } => "setup",
        Commands::Uninstall { .. } => "uninstall",
    };
    append_run_log(
        "info",
        "run.started",
        json!({
            "command": command_name,
            "state_dir": scope.state_dir.display().to_string(),
            "interactive": runtime.terminal.stdin_is_tty(),
        }),
    );

    let result = match &cli.command {
        Commands::Setup { .. } => run_setup(runtime, &cfg, &scope).map(|_| 0),
        Commands::Uninstall { log } => run_uninstall(runtime, &scope, log.as_deref()),
    };
    if let Err(error) = &result {
        append_run_log(
            "error",
            "run.failed",
            json!({ "error": error.to_string() }),
        );
    }
    result
}

fn env_to_map(env: &[(std::ffi::OsString, std::ffi::OsString)]) -> EnvMap {
    let mut map = EnvMap::new();
    for (key, value) in env {
        if let (Some(key), Some(value)) = (key.to_str(), value.to_str()) {
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}
