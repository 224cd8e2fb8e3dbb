use crate::errors::DevsetupError;
use crate::logging::append_run_log;
use crate::runtime::{ProcessRequest, ProcessRunner};
use crate::shell;
use serde_json::json;

/// True when `binary` resolves on PATH (`command -v`).
pub fn tool_available(runner: &dyn ProcessRunner, binary: &str) -> bool {
    let probe = format!("command -v {}", shell::quote(binary));
    let found = runner
        .run(ProcessRequest::new("sh", ["-c", probe.as_str()]))
        .map(|out| out.success())
        .unwrap_or(false);
    append_run_log(
        "debug",
        "preflight.tool.probed",
        json!({ "binary": binary, "found": found }),
    );
    found
}

pub fn require_tool(runner: &dyn ProcessRunner, binary: &str) -> Result<(), DevsetupError> {
    if tool_available(runner, binary) {
        return Ok(());
    }
    append_run_log(
        "error",
        "preflight.tool.missing",
        json!({ "binary": binary }),
    );
    Err(DevsetupError::MissingTool(binary.to_string()))
}
