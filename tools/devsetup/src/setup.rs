use crate::config::AppConfig;
use crate::errors::DevsetupError;
use crate::git_config::{restore_command, GitConfigClient};
use crate::logging::append_run_log;
use crate::package_manager::PackageManager;
use crate::preflight::require_tool;
use crate::prompt::ask;
use crate::runtime::{ProductionRuntime, Terminal};
use crate::types::{Answer, RuntimeScope};
use crate::undo::discovery::new_log_path;
use crate::undo::log::UndoLog;
use crate::undo::recorder::ActionRecorder;
use serde_json::json;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupSummary {
    pub installed: usize,
    pub configured: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub recorded: usize,
    pub undo_log: Option<PathBuf>,
}

enum Decision {
    Proceed,
    Declined(Answer),
    DryRun,
}

struct SetupContext<'a> {
    terminal: &'a dyn Terminal,
    force: bool,
    dry_run: bool,
}

impl SetupContext<'_> {
    fn decide(&self, question: &str, preview: &str) -> Result<Decision, DevsetupError> {
        if self.dry_run {
            self.terminal.write_line(&format!("[dry-run] would {preview}"))?;
            return Ok(Decision::DryRun);
        }
        if self.force {
            return Ok(Decision::Proceed);
        }
        match ask(self.terminal, question)? {
            Answer::Yes => Ok(Decision::Proceed),
            other => Ok(Decision::Declined(other)),
        }
    }
}

/// Installs the configured packages and applies the configured git settings,
/// recording an undo command for each change that succeeds.
pub fn run_setup(
    runtime: &ProductionRuntime,
    cfg: &AppConfig,
    scope: &RuntimeScope,
) -> Result<SetupSummary, DevsetupError> {
    let runner = runtime.process_runner.as_ref();
    let terminal = runtime.terminal.as_ref();
    let fs = runtime.file_system.as_ref();

    require_tool(runner, "git")?;
    let packages = PackageManager::detect(
        runner,
        cfg.package_manager.kind,
        cfg.package_manager.use_sudo,
    )?;
    let git = GitConfigClient::new(runner);

    let log_path = new_log_path(&scope.state_dir, runtime.clock.as_ref(), fs);
    let mut recorder = ActionRecorder::new(UndoLog::new(log_path, fs), terminal);
    let ctx = SetupContext {
        terminal,
        force: cfg.setup.force,
        dry_run: cfg.setup.dry_run,
    };
    let mut summary = SetupSummary::default();

    append_run_log(
        "info",
        "setup.started",
        json!({
            "package_manager": packages.kind().as_str(),
            "packages": cfg.packages.install,
            "git_settings": cfg.git.settings.len(),
            "force": ctx.force,
            "dry_run": ctx.dry_run,
            "undo_log": recorder.path().display().to_string(),
        }),
    );
    terminal.write_line(&format!(
        "Using package manager: {}",
        packages.kind().as_str()
    ))?;

    for package in &cfg.packages.install {
        install_package(&ctx, &packages, &mut recorder, &mut summary, package)?;
    }
    for (key, value) in &cfg.git.settings {
        apply_git_setting(&ctx, &git, &mut recorder, &mut summary, key, value)?;
    }

    summary.recorded = recorder.recorded_count();
    if summary.recorded > 0 {
        summary.undo_log = Some(recorder.path().to_path_buf());
    }
    report(terminal, &summary)?;
    Ok(summary)
}

fn install_package(
    ctx: &SetupContext<'_>,
    packages: &PackageManager<'_>,
    recorder: &mut ActionRecorder<'_>,
    summary: &mut SetupSummary,
    package: &str,
) -> Result<(), DevsetupError> {
    if packages.is_installed(package)? {
        summary.unchanged += 1;
        ctx.terminal
            .write_line(&format!("{package}: already installed"))?;
        return Ok(());
    }

    match ctx.decide(&format!("Install {package}?"), &format!("install {package}"))? {
        Decision::DryRun => return Ok(()),
        Decision::Declined(answer) => {
            summary.skipped += 1;
            append_run_log(
                "info",
                "setup.package.declined",
                json!({ "package": package, "answer": format!("{answer:?}") }),
            );
            ctx.terminal.write_line(&format!("{package}: skipped"))?;
            return Ok(());
        }
        Decision::Proceed => {}
    }

    let out = match packages.install(package) {
        Ok(out) => out,
        Err(error) => {
            summary.failed += 1;
            ctx.terminal
                .write_line(&format!("{package}: install failed ({error})"))?;
            return Ok(());
        }
    };
    if !out.success() {
        summary.failed += 1;
        ctx.terminal.write_line(&format!(
            "{package}: install failed (exit code {}) {}",
            out.exit_code,
            out.stderr.trim()
        ))?;
        return Ok(());
    }

    summary.installed += 1;
    recorder.record(&packages.remove_command(package));
    ctx.terminal.write_line(&format!("{package}: installed"))
}

fn apply_git_setting(
    ctx: &SetupContext<'_>,
    git: &GitConfigClient<'_>,
    recorder: &mut ActionRecorder<'_>,
    summary: &mut SetupSummary,
    key: &str,
    value: &str,
) -> Result<(), DevsetupError> {
    let previous = match git.get(key) {
        Ok(previous) => previous,
        Err(error) => {
            summary.failed += 1;
            ctx.terminal
                .write_line(&format!("{key}: could not read current value ({error})"))?;
            return Ok(());
        }
    };
    if previous.as_deref() == Some(value) {
        summary.unchanged += 1;
        ctx.terminal
            .write_line(&format!("{key}: already set to {value}"))?;
        return Ok(());
    }
    if previous.as_deref().is_some_and(|p| p.contains(['\n', '\r'])) {
        summary.skipped += 1;
        ctx.terminal.write_line(&format!(
            "{key}: current value spans several lines and cannot be restored automatically; left unchanged"
        ))?;
        return Ok(());
    }

    let from = previous.as_deref().unwrap_or("<unset>");
    match ctx.decide(
        &format!("Set git {key} = {value} (currently {from})?"),
        &format!("set git {key} = {value} (currently {from})"),
    )? {
        Decision::DryRun => return Ok(()),
        Decision::Declined(answer) => {
            summary.skipped += 1;
            append_run_log(
                "info",
                "setup.git.declined",
                json!({ "key": key, "answer": format!("{answer:?}") }),
            );
            ctx.terminal.write_line(&format!("{key}: skipped"))?;
            return Ok(());
        }
        Decision::Proceed => {}
    }

    let succeeded = match git.set(key, value) {
        Ok(out) if out.success() => true,
        Ok(out) => {
            ctx.terminal.write_line(&format!(
                "{key}: git config failed (exit code {}) {}",
                out.exit_code,
                out.stderr.trim()
            ))?;
            false
        }
        Err(error) => {
            ctx.terminal
                .write_line(&format!("{key}: git config failed ({error})"))?;
            false
        }
    };
    if !succeeded {
        summary.failed += 1;
        return Ok(());
    }

    summary.configured += 1;
    recorder.record(&restore_command(key, previous.as_deref()));
    ctx.terminal.write_line(&format!("{key}: set to {value}"))
}

fn report(terminal: &dyn Terminal, summary: &SetupSummary) -> Result<(), DevsetupError> {
    append_run_log(
        if summary.failed > 0 { "warn" } else { "info" },
        "setup.finished",
        json!({
            "installed": summary.installed,
            "configured": summary.configured,
            "unchanged": summary.unchanged,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "recorded": summary.recorded,
            "undo_log": summary.undo_log.as_ref().map(|p| p.display().to_string()),
        }),
    );
    terminal.write_line(&format!(
        "Setup finished: {} installed, {} configured, {} unchanged, {} skipped, {} failed.",
        summary.installed, summary.configured, summary.unchanged, summary.skipped, summary.failed
    ))?;
    match &summary.undo_log {
        Some(path) => terminal.write_line(&format!(
            "Recorded {} undo entr{} in {}; run `devsetup uninstall` to reverse.",
            summary.recorded,
            if summary.recorded == 1 { "y" } else { "ies" },
            path.display()
        )),
        None => terminal.write_line("No reversible actions recorded."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{FakeClock, FakeFileSystem, FakeProcessRunner, FakeTerminal};
    use crate::types::PackageManagerKind;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    struct Harness {
        fs: FakeFileSystem,
        runner: FakeProcessRunner,
        terminal: FakeTerminal,
        runtime: ProductionRuntime,
    }

    fn harness(inputs: &[&str]) -> Harness {
        let fs = FakeFileSystem::default();
        let runner = FakeProcessRunner::default();
        let terminal = FakeTerminal::with_inputs(inputs.iter().copied());
        let runtime = ProductionRuntime {
            clock: Arc::new(FakeClock::new(UNIX_EPOCH + Duration::from_secs(1000))),
            file_system: Arc::new(fs.clone()),
            process_runner: Arc::new(runner.clone()),
            terminal: Arc::new(terminal.clone()),
        };
        Harness {
            fs,
            runner,
            terminal,
            runtime,
        }
    }

    fn config(packages: &[&str], settings: &[(&str, &str)]) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.packages.install = packages.iter().map(|p| p.to_string()).collect();
        cfg.package_manager.kind = Some(PackageManagerKind::Brew);
        cfg.git.settings = settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        cfg
    }

    fn scope() -> RuntimeScope {
        RuntimeScope {
            state_dir: PathBuf::from("/state"),
            audit_log: PathBuf::from("/state/audit.jsonl"),
        }
    }

    /// git on PATH, brew on PATH.
    fn push_preflight(runner: &FakeProcessRunner) {
        runner.push_exit(0, "/usr/bin/git\n");
        runner.push_exit(0, "/opt/homebrew/bin/brew\n");
    }

    const LOG: &str = "/state/undo-1000.log";

    #[test]
    fn successful_install_records_remove_command() {
        let h = harness(&["y"]);
        push_preflight(&h.runner);
        h.runner.push_exit(1, ""); // jq not installed
        h.runner.push_exit(0, ""); // brew install jq

        let summary = run_setup(&h.runtime, &config(&["jq"], &[]), &scope()).expect("setup");

        assert_eq!(summary.installed, 1);
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.undo_log, Some(PathBuf::from(LOG)));
        assert_eq!(h.fs.contents(Path::new(LOG)).as_deref(), Some("brew uninstall jq\n"));
    }

    #[test]
    fn declined_skipped_and_present_packages_record_nothing() {
        let h = harness(&["n", "s"]);
        push_preflight(&h.runner);
        h.runner.push_exit(0, "git 2.44\n"); // git already installed
        h.runner.push_exit(1, ""); // jq missing -> declined
        h.runner.push_exit(1, ""); // fd missing -> skipped

        let summary =
            run_setup(&h.runtime, &config(&["git", "jq", "fd"], &[]), &scope()).expect("setup");

        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.recorded, 0);
        assert_eq!(summary.undo_log, None);
        assert!(h.fs.contents(Path::new(LOG)).is_none());
        assert_eq!(h.terminal.prompts().len(), 2);
        assert!(h
            .terminal
            .written_lines()
            .contains(&"No reversible actions recorded.".to_string()));
    }

    #[test]
    fn failed_install_records_nothing_and_continues() {
        let h = harness(&["y", "y"]);
        push_preflight(&h.runner);
        h.runner.push_exit(1, "");
        h.runner.push_response(Ok(crate::runtime::ProcessOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "Error: No available formula".to_string(),
        }));
        h.runner.push_exit(1, "");
        h.runner.push_exit(0, "");

        let summary =
            run_setup(&h.runtime, &config(&["nope", "tmux"], &[]), &scope()).expect("setup");

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.installed, 1);
        assert_eq!(h.fs.contents(Path::new(LOG)).as_deref(), Some("brew uninstall tmux\n"));
        assert!(h
            .terminal
            .written_lines()
            .iter()
            .any(|l| l.contains("No available formula")));
    }

    #[test]
    fn git_settings_record_restore_or_unset() {
        let h = harness(&[]);
        push_preflight(&h.runner);
        h.runner.push_exit(0, "false\n"); // pull.rebase currently false
        h.runner.push_exit(0, ""); // set pull.rebase
        h.runner.push_exit(1, ""); // push.autoSetupRemote unset
        h.runner.push_exit(0, ""); // set push.autoSetupRemote
        let mut cfg = config(&[], &[("pull.rebase", "true"), ("push.autoSetupRemote", "true")]);
        cfg.setup.force = true;

        let summary = run_setup(&h.runtime, &cfg, &scope()).expect("setup");

        assert_eq!(summary.configured, 2);
        assert!(h.terminal.prompts().is_empty());
        assert_eq!(
            h.fs.contents(Path::new(LOG)).as_deref(),
            Some(
                "git config --global pull.rebase false\n\
                 git config --global --unset push.autoSetupRemote\n"
            )
        );
    }

    #[test]
    fn git_setting_already_at_target_is_left_alone() {
        let h = harness(&[]);
        push_preflight(&h.runner);
        h.runner.push_exit(0, "main\n");

        let summary =
            run_setup(&h.runtime, &config(&[], &[("init.defaultBranch", "main")]), &scope())
                .expect("setup");

        assert_eq!(summary.unchanged, 1);
        assert_eq!(h.runner.pending_responses(), 0);
        assert_eq!(h.runner.spawned().len(), 3);
    }

    #[test]
    fn failed_git_set_records_nothing() {
        let h = harness(&["y"]);
        push_preflight(&h.runner);
        h.runner.push_exit(1, "");
        h.runner.push_exit(255, "");

        let summary =
            run_setup(&h.runtime, &config(&[], &[("core.autocrlf", "input")]), &scope())
                .expect("setup");

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.recorded, 0);
        assert!(h.fs.contents(Path::new(LOG)).is_none());
    }

    #[test]
    fn dry_run_mutates_and_records_nothing() {
        let h = harness(&[]);
        push_preflight(&h.runner);
        h.runner.push_exit(1, ""); // jq missing
        h.runner.push_exit(1, ""); // pull.rebase unset
        let mut cfg = config(&["jq"], &[("pull.rebase", "true")]);
        cfg.setup.dry_run = true;

        let summary = run_setup(&h.runtime, &cfg, &scope()).expect("setup");

        assert_eq!(summary.recorded, 0);
        assert_eq!(h.runner.spawned().len(), 4);
        let lines = h.terminal.written_lines();
        assert!(lines.contains(&"[dry-run] would install jq".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("[dry-run] would set git pull.rebase = true")));
    }

    #[test]
    fn missing_git_aborts_before_any_change() {
        let h = harness(&[]);
        h.runner.push_exit(1, "");

        let err = run_setup(&h.runtime, &config(&["jq"], &[]), &scope()).expect_err("no git");

        assert!(matches!(err, DevsetupError::MissingTool(ref t) if t == "git"));
        assert_eq!(h.runner.spawned().len(), 1);
    }

    #[test]
    fn second_run_in_same_second_uses_a_fresh_log() {
        let h = harness(&[]);
        h.fs.insert(LOG, "brew uninstall jq\n");
        push_preflight(&h.runner);
        h.runner.push_exit(1, "");
        h.runner.push_exit(0, "");
        let mut cfg = config(&["fd"], &[]);
        cfg.setup.force = true;

        let summary = run_setup(&h.runtime, &cfg, &scope()).expect("setup");

        assert_eq!(summary.undo_log, Some(PathBuf::from("/state/undo-1000-1.log")));
        assert_eq!(h.fs.contents(Path::new(LOG)).as_deref(), Some("brew uninstall jq\n"));
    }

    #[test]
    fn undo_write_failure_is_reported_and_setup_continues() {
        let h = harness(&[]);
        h.fs.set_fail_next(DevsetupError::Io("read-only file system".to_string()));
        push_preflight(&h.runner);
        h.runner.push_exit(1, "");
        h.runner.push_exit(0, "");
        h.runner.push_exit(1, "");
        h.runner.push_exit(0, "");
        let mut cfg = config(&["jq", "fd"], &[]);
        cfg.setup.force = true;

        let summary = run_setup(&h.runtime, &cfg, &scope()).expect("setup");

        assert_eq!(summary.installed, 2);
        assert_eq!(summary.recorded, 1);
        assert_eq!(h.fs.contents(Path::new(LOG)).as_deref(), Some("brew uninstall fd\n"));
        assert!(h.terminal.written_lines().iter().any(|l| {
            l.contains("could not write undo entry") && l.contains("brew uninstall jq")
        }));
    }

    #[test]
    fn install_is_recorded_even_when_its_echo_fails() {
        let h = harness(&[]);
        h.terminal.break_writes_containing("jq: installed");
        push_preflight(&h.runner);
        h.runner.push_exit(1, "");
        h.runner.push_exit(0, "");
        let mut cfg = config(&["jq"], &[]);
        cfg.setup.force = true;

        let err = run_setup(&h.runtime, &cfg, &scope()).expect_err("terminal gone");

        assert!(matches!(err, DevsetupError::Io(_)));
        assert_eq!(h.fs.contents(Path::new(LOG)).as_deref(), Some("brew uninstall jq\n"));
    }

    #[test]
    fn git_change_is_recorded_even_when_its_echo_fails() {
        let h = harness(&[]);
        h.terminal.break_writes_containing("set to");
        push_preflight(&h.runner);
        h.runner.push_exit(0, "merges\n");
        h.runner.push_exit(0, "");
        let mut cfg = config(&[], &[("pull.rebase", "true")]);
        cfg.setup.force = true;

        let err = run_setup(&h.runtime, &cfg, &scope()).expect_err("terminal gone");

        assert!(matches!(err, DevsetupError::Io(_)));
        assert_eq!(
            h.fs.contents(Path::new(LOG)).as_deref(),
            Some("git config --global pull.rebase merges\n")
        );
    }
}
