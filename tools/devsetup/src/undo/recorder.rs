use crate::logging::append_run_log;
use crate::runtime::Terminal;
use crate::undo::log::UndoLog;
use serde_json::json;
use std::path::Path;

/// Appends one reversing command per successful mutation to an [`UndoLog`].
///
/// The log file (and its directory) is created on the first `record`, so a
/// run that changes nothing leaves nothing behind. Commands are written as
/// given: no dedup, no validation.
pub struct ActionRecorder<'a> {
    log: UndoLog<'a>,
    terminal: &'a dyn Terminal,
    parent_ready: bool,
    recorded: usize,
}

impl<'a> ActionRecorder<'a> {
    pub fn new(log: UndoLog<'a>, terminal: &'a dyn Terminal) -> Self {
        Self {
            log,
            terminal,
            parent_ready: false,
            recorded: 0,
        }
    }

    pub fn path(&self) -> &Path {
        self.log.path()
    }

    pub fn recorded_count(&self) -> usize {
        self.recorded
    }

    /// Returns whether the command reached the log. A write failure is
    /// reported and swallowed: the setup run goes on, but the undo for that
    /// one action is lost.
    pub fn record(&mut self, command: &str) -> bool {
        let result = self.ensure_parent().and_then(|_| self.log.append(command));
        match result {
            Ok(()) => {
                self.recorded += 1;
                append_run_log(
                    "info",
                    "undo.record.appended",
                    json!({
                        "path": self.log.path().display().to_string(),
                        "command": command,
                        "position": self.recorded,
                    }),
                );
                true
            }
            Err(error) => {
                append_run_log(
                    "warn",
                    "undo.record.write_failed",
                    json!({
                        "path": self.log.path().display().to_string(),
                        "command": command,
                        "error": error.to_string(),
                    }),
                );
                let _ = self.terminal.write_line(&format!(
                    "warning: could not write undo entry to {} ({error}); undo manually with: {command}",
                    self.log.path().display()
                ));
                false
            }
        }
    }

    fn ensure_parent(&mut self) -> Result<(), crate::errors::DevsetupError> {
        if !self.parent_ready {
            self.log.ensure_parent()?;
            self.parent_ready = true;
        }
        Ok(())
    }
}
