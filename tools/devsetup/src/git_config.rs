use crate::errors::DevsetupError;
use crate::logging::append_run_log;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::shell;
use serde_json::json;

pub struct GitConfigClient<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> GitConfigClient<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    /// Current global value; `None` when the key is unset (git exits 1).
    pub fn get(&self, key: &str) -> Result<Option<String>, DevsetupError> {
        let out = self.run(["config", "--global", "--get", key])?;
        match out.exit_code {
            0 => {
                let value = out
                    .stdout
                    .strip_suffix('\n')
                    .unwrap_or(&out.stdout)
                    .to_string();
                Ok(Some(value))
            }
            1 => Ok(None),
            code => Err(DevsetupError::Process(format!(
                "git config --get {key} exited with {code}: {}",
                out.stderr.trim()
            ))),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<ProcessOutput, DevsetupError> {
        let out = self.run(["config", "--global", key, value])?;
        append_run_log(
            if out.success() { "info" } else { "warn" },
            "git.config.set",
            json!({
                "key": key,
                "value": value,
                "exit_code": out.exit_code,
                "stderr": out.stderr,
            }),
        );
        Ok(out)
    }

    fn run<const N: usize>(&self, args: [&str; N]) -> Result<ProcessOutput, DevsetupError> {
        self.runner.run(ProcessRequest::new("git", args))
    }
}

/// The command that puts `key` back to `previous`, or unsets it when it had
/// no value before.
pub fn restore_command(key: &str, previous: Option<&str>) -> String {
    match previous {
        Some(value) => shell::join(["git", "config", "--global", key, value]),
        None => shell::join(["git", "config", "--global", "--unset", key]),
    }
}
