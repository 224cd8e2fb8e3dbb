use crate::errors::DevsetupError;
use crate::executor::{CommandExecutor, ExitSignal};
use crate::logging::append_run_log;
use crate::prompt::confirm;
use crate::runtime::Terminal;
use crate::undo::log::{UndoEntry, UndoLog};
use serde_json::json;

pub const EXIT_COMPLETED: i32 = 0;
pub const EXIT_CANCELLED: i32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub entry: UndoEntry,
    pub signal: ExitSignal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayTally {
    pub success_count: usize,
    pub error_count: usize,
    pub failures: Vec<EntryFailure>,
}

impl ReplayTally {
    pub fn attempted(&self) -> usize {
        self.success_count + self.error_count
    }
}

/// What happened to the log file after a completed replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDisposition {
    Kept,
    Removed,
    RemovalFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// The operator declined before anything ran.
    Cancelled,
    Completed {
        tally: ReplayTally,
        log: LogDisposition,
    },
}

impl ReplayOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => EXIT_CANCELLED,
            Self::Completed { .. } => EXIT_COMPLETED,
        }
    }

    pub fn tally(&self) -> Option<&ReplayTally> {
        match self {
            Self::Cancelled => None,
            Self::Completed { tally, .. } => Some(tally),
        }
    }
}

/// Runs every entry of an undo log, in file order, exactly once.
pub struct UndoReplayer<'a> {
    executor: &'a dyn CommandExecutor,
    terminal: &'a dyn Terminal,
}

impl<'a> UndoReplayer<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, terminal: &'a dyn Terminal) -> Self {
        Self { executor, terminal }
    }

    /// Errors only on preconditions (log missing or unreadable) and terminal
    /// I/O before the operator confirms. Once entries start running, every
    /// entry is attempted and terminal failures are only logged.
    pub fn replay(&self, log: &UndoLog<'_>) -> Result<ReplayOutcome, DevsetupError> {
        let path = log.path().display().to_string();
        let entries = log.load()?;

        self.terminal
            .write_line(&format!("Undo log: {path} ({} entries)", entries.len()))?;
        for (idx, entry) in entries.iter().enumerate() {
            self.terminal
                .write_line(&format!("  {:>3}. {}", idx + 1, entry.command))?;
        }

        if !confirm(self.terminal, "Run these commands to undo the recorded setup?")? {
            append_run_log(
                "info",
                "undo.replay.cancelled",
                json!({ "path": path, "entries": entries.len() }),
            );
            self.terminal.write_line("Cancelled; nothing was changed.")?;
            return Ok(ReplayOutcome::Cancelled);
        }

        append_run_log(
            "info",
            "undo.replay.started",
            json!({ "path": path, "entries": entries.len() }),
        );
        let mut lost_lines = 0;
        let tally = self.execute_all(entries, &mut lost_lines);
        self.report(&tally, &mut lost_lines);
        if lost_lines > 0 {
            append_run_log(
                "warn",
                "undo.replay.output_lost",
                json!({ "path": path, "lines": lost_lines }),
            );
        }

        let disposition = self.offer_removal(log);
        Ok(ReplayOutcome::Completed {
            tally,
            log: disposition,
        })
    }

    /// Best-effort terminal line; a failed write is logged and counted.
    fn echo(&self, line: &str, lost_lines: &mut usize) {
        if let Err(error) = self.terminal.write_line(line) {
            *lost_lines += 1;
            append_run_log(
                "warn",
                "undo.replay.echo_failed",
                json!({ "line": line, "error": error.to_string() }),
            );
        }
    }

    fn execute_all(&self, entries: Vec<UndoEntry>, lost_lines: &mut usize) -> ReplayTally {
        let mut tally = ReplayTally::default();
        for entry in entries {
            let result = self.executor.execute(&entry.command);
            if result.succeeded {
                tally.success_count += 1;
                append_run_log(
                    "info",
                    "undo.replay.entry_succeeded",
                    json!({ "line": entry.line_number, "command": entry.command }),
                );
                self.echo(&format!("[ok] {}", entry.command), lost_lines);
            } else {
                tally.error_count += 1;
                append_run_log(
                    "warn",
                    "undo.replay.entry_failed",
                    json!({
                        "line": entry.line_number,
                        "command": entry.command,
                        "signal": result.signal.to_string(),
                    }),
                );
                self.echo(
                    &format!("[failed] {} ({})", entry.command, result.signal),
                    lost_lines,
                );
                tally.failures.push(EntryFailure {
                    entry,
                    signal: result.signal,
                });
            }
        }
        tally
    }

    fn report(&self, tally: &ReplayTally, lost_lines: &mut usize) {
        append_run_log(
            if tally.error_count > 0 { "warn" } else { "info" },
            "undo.replay.finished",
            json!({
                "succeeded": tally.success_count,
                "failed": tally.error_count,
            }),
        );
        self.echo(
            &format!(
                "Undo finished: {} succeeded, {} failed.",
                tally.success_count, tally.error_count
            ),
            lost_lines,
        );
        if tally.error_count > 0 {
            self.echo(
                "warning: some entries failed; manual follow-up may be required:",
                lost_lines,
            );
            for failure in &tally.failures {
                self.echo(
                    &format!(
                        "  line {}: {}",
                        failure.entry.line_number, failure.entry.command
                    ),
                    lost_lines,
                );
            }
        }
    }

    /// A prompt that cannot be shown or answered keeps the log.
    fn offer_removal(&self, log: &UndoLog<'_>) -> LogDisposition {
        let path = log.path().display().to_string();
        match confirm(self.terminal, &format!("Delete undo log {path}?")) {
            Ok(true) => {}
            Ok(false) => return LogDisposition::Kept,
            Err(error) => {
                append_run_log(
                    "warn",
                    "undo.log.removal_prompt_failed",
                    json!({ "path": path, "error": error.to_string() }),
                );
                return LogDisposition::Kept;
            }
        }
        let mut lost_lines = 0;
        match log.remove() {
            Ok(()) => {
                append_run_log("info", "undo.log.removed", json!({ "path": path }));
                self.echo(&format!("Removed {path}"), &mut lost_lines);
                LogDisposition::Removed
            }
            Err(error) => {
                append_run_log(
                    "warn",
                    "undo.log.remove_failed",
                    json!({ "path": path, "error": error.to_string() }),
                );
                self.echo(
                    &format!("warning: could not delete {path}: {error}"),
                    &mut lost_lines,
                );
                LogDisposition::RemovalFailed(error.to_string())
            }
        }
    }
}
