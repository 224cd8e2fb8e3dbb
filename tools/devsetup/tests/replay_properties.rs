//! Property tests for the undo log: whatever mix of outcomes and blank lines
//! a log holds, replay attempts each entry once, in order, and the tally adds
//! up.

use devsetup::executor::{CommandExecutor, ExecutionResult};
use devsetup::runtime::{FakeFileSystem, FakeTerminal};
use devsetup::undo::log::UndoLog;
use devsetup::undo::recorder::ActionRecorder;
use devsetup::undo::replayer::{ReplayOutcome, UndoReplayer};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Mutex;

/// Fails any command in `failing`, succeeds otherwise; remembers call order.
struct ScriptedExecutor {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn new(failing: HashSet<String>) -> Self {
        Self {
            failing,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &str) -> ExecutionResult {
        self.calls
            .lock()
            .expect("calls lock")
            .push(command.to_string());
        if self.failing.contains(command) {
            ExecutionResult::from_exit_code(1)
        } else {
            ExecutionResult::from_exit_code(0)
        }
    }
}

fn command_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9 ._-]{0,16}".prop_map(|s| s.trim_end().to_string())
}

fn blank_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), Just("   ".to_string()), Just("\t".to_string())]
}

/// (line, is_command, should_fail) rows for one log file.
fn log_rows() -> impl Strategy<Value = Vec<(String, bool, bool)>> {
    prop::collection::vec(
        prop_oneof![
            4 => (command_strategy(), any::<bool>()).prop_map(|(c, fail)| (c, true, fail)),
            1 => blank_strategy().prop_map(|b| (b, false, false)),
        ],
        0..24,
    )
}

fn replay_with(
    raw: &str,
    failing: HashSet<String>,
) -> (ReplayOutcome, Vec<String>) {
    let fs = FakeFileSystem::with_file("/state/undo-1.log", raw);
    let terminal = FakeTerminal::with_inputs(["y", "n"]);
    let executor = ScriptedExecutor::new(failing);
    let log = UndoLog::new("/state/undo-1.log", &fs);
    let outcome = UndoReplayer::new(&executor, &terminal)
        .replay(&log)
        .expect("replay");
    (outcome, executor.calls())
}

proptest! {
    /// Every non-blank line runs exactly once, in file order.
    #[test]
    fn replay_attempts_each_entry_once_in_order(rows in log_rows()) {
        let raw = rows.iter().map(|(line, _, _)| format!("{line}\n")).collect::<String>();
        let expected = rows
            .iter()
            .filter(|(_, is_command, _)| *is_command)
            .map(|(line, _, _)| line.clone())
            .collect::<Vec<_>>();

        let (outcome, calls) = replay_with(&raw, HashSet::new());

        prop_assert_eq!(&calls, &expected);
        let tally = outcome.tally().expect("completed");
        prop_assert_eq!(tally.success_count, expected.len());
        prop_assert_eq!(tally.error_count, 0);
        prop_assert_eq!(outcome.exit_code(), 0);
    }

    /// success + error == attempted, and failures list exactly the failing lines.
    #[test]
    fn tally_partitions_outcomes(rows in log_rows()) {
        let raw = rows.iter().map(|(line, _, _)| format!("{line}\n")).collect::<String>();
        let failing = rows
            .iter()
            .filter(|(_, is_command, fail)| *is_command && *fail)
            .map(|(line, _, _)| line.clone())
            .collect::<HashSet<_>>();
        let commands = rows
            .iter()
            .filter(|(_, is_command, _)| *is_command)
            .map(|(line, _, _)| line.clone())
            .collect::<Vec<_>>();
        let expected_errors = commands.iter().filter(|c| failing.contains(*c)).count();

        let (outcome, calls) = replay_with(&raw, failing.clone());

        let tally = outcome.tally().expect("completed");
        prop_assert_eq!(calls.len(), commands.len());
        prop_assert_eq!(tally.attempted(), commands.len());
        prop_assert_eq!(tally.error_count, expected_errors);
        prop_assert_eq!(tally.success_count, commands.len() - expected_errors);
        prop_assert!(tally.failures.iter().all(|f| failing.contains(&f.entry.command)));
        prop_assert_eq!(outcome.exit_code(), 0);
    }

    /// Whatever the recorder writes, the replayer reads back unchanged.
    #[test]
    fn recorded_commands_replay_verbatim(commands in prop::collection::vec(command_strategy(), 1..16)) {
        let fs = FakeFileSystem::default();
        let terminal = FakeTerminal::new(false);
        let mut recorder = ActionRecorder::new(UndoLog::new("/state/undo-9.log", &fs), &terminal);
        for command in &commands {
            prop_assert!(recorder.record(command));
        }
        prop_assert_eq!(recorder.recorded_count(), commands.len());

        let raw = fs
            .contents(std::path::Path::new("/state/undo-9.log"))
            .expect("log written");
        let (_, calls) = replay_with(&raw, HashSet::new());
        prop_assert_eq!(calls, commands);
    }
}

#[test]
fn declined_replay_attempts_nothing() {
    let fs = FakeFileSystem::with_file("/state/undo-1.log", "a\nb\n");
    let terminal = FakeTerminal::with_inputs(["n"]);
    let executor = ScriptedExecutor::new(HashSet::new());
    let log = UndoLog::new("/state/undo-1.log", &fs);
    let outcome = UndoReplayer::new(&executor, &terminal)
        .replay(&log)
        .expect("replay");
    assert_eq!(outcome, ReplayOutcome::Cancelled);
    assert_eq!(outcome.exit_code(), 2);
    assert!(executor.calls().is_empty());
}
