use crate::errors::DevsetupError;
use crate::executor::ShellExecutor;
use crate::logging::append_run_log;
use crate::runtime::ProductionRuntime;
use crate::types::RuntimeScope;
use crate::undo::discovery::{discover, select};
use crate::undo::log::UndoLog;
use crate::undo::replayer::{ReplayOutcome, UndoReplayer};
use serde_json::json;
use std::path::{Path, PathBuf};

/// Replays an undo log: `explicit` when given, otherwise one discovered in
/// the state directory. Returns the process exit code.
pub fn run_uninstall(
    runtime: &ProductionRuntime,
    scope: &RuntimeScope,
    explicit: Option<&Path>,
) -> Result<i32, DevsetupError> {
    let fs = runtime.file_system.as_ref();
    let terminal = runtime.terminal.as_ref();

    let path = resolve_log_path(runtime, scope, explicit)?;
    let log = UndoLog::new(path, fs);
    let executor = ShellExecutor::new(runtime.process_runner.as_ref());
    let outcome = UndoReplayer::new(&executor, terminal).replay(&log)?;

    let (succeeded, failed) = outcome
        .tally()
        .map(|t| (t.success_count, t.error_count))
        .unwrap_or((0, 0));
    append_run_log(
        "info",
        "uninstall.finished",
        json!({
            "path": log.path().display().to_string(),
            "cancelled": matches!(outcome, ReplayOutcome::Cancelled),
            "succeeded": succeeded,
            "failed": failed,
            "exit_code": outcome.exit_code(),
        }),
    );
    Ok(outcome.exit_code())
}

fn resolve_log_path(
    runtime: &ProductionRuntime,
    scope: &RuntimeScope,
    explicit: Option<&Path>,
) -> Result<PathBuf, DevsetupError> {
    let fs = runtime.file_system.as_ref();
    if let Some(path) = explicit {
        if !fs.exists(path) {
            return Err(DevsetupError::UndoLogNotFound(path.display().to_string()));
        }
        return Ok(path.to_path_buf());
    }
    let candidates = discover(fs, &scope.state_dir)?;
    append_run_log(
        "debug",
        "uninstall.discovered",
        json!({
            "dir": scope.state_dir.display().to_string(),
            "candidates": candidates.len(),
        }),
    );
    select(&candidates, &scope.state_dir, runtime.terminal.as_ref())
}
