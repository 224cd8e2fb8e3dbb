use thiserror::Error;

#[derive(Debug, Error)]
pub enum DevsetupError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("required tool not found: {0}")]
    MissingTool(String),
    #[error("undo log not found: {0}")]
    UndoLogNotFound(String),
    #[error("no undo logs found in {0}; no reversible actions are recorded")]
    NoUndoLogs(String),
}
