//! The narrow capability the undo replayer needs from the host: run one
//! command string and say whether it worked.

use crate::logging::append_run_log;
use crate::runtime::{ProcessRequest, ProcessRunner};
use serde_json::json;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitSignal {
    Code(i32),
    Error(String),
}

impl fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exit code {code}"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub signal: ExitSignal,
}

impl ExecutionResult {
    pub fn from_exit_code(code: i32) -> Self {
        Self {
            succeeded: code == 0,
            signal: ExitSignal::Code(code),
        }
    }

    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            signal: ExitSignal::Error(message.into()),
        }
    }
}

pub trait CommandExecutor {
    fn execute(&self, command: &str) -> ExecutionResult;
}

/// Runs each command through `sh -c`.
pub struct ShellExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    shell: String,
}

impl<'a> ShellExecutor<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(runner: &'a dyn ProcessRunner, shell: impl Into<String>) -> Self {
        Self {
            runner,
            shell: shell.into(),
        }
    }
}

impl CommandExecutor for ShellExecutor<'_> {
    fn execute(&self, command: &str) -> ExecutionResult {
        let request = ProcessRequest::new(&self.shell, ["-c", command]);
        match self.runner.run(request) {
            Ok(output) => {
                append_run_log(
                    if output.success() { "debug" } else { "warn" },
                    "executor.command.finished",
                    json!({
                        "command": command,
                        "exit_code": output.exit_code,
                        "stderr": output.stderr,
                    }),
                );
                ExecutionResult::from_exit_code(output.exit_code)
            }
            Err(error) => {
                append_run_log(
                    "error",
                    "executor.command.spawn_failed",
                    json!({
                        "command": command,
                        "error": error.to_string(),
                    }),
                );
                ExecutionResult::from_error(error.to_string())
            }
        }
    }
}
