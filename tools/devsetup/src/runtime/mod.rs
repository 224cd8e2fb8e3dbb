use crate::errors::DevsetupError;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessRequest {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

pub trait ProcessRunner: Send + Sync {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, DevsetupError>;
    fn wait(&self, handle: u64) -> Result<ProcessOutput, DevsetupError>;

    fn run(&self, request: ProcessRequest) -> Result<ProcessOutput, DevsetupError> {
        let handle = self.spawn(request)?;
        self.wait(handle)
    }
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, DevsetupError>;
    fn append_line(&self, path: &Path, line: &str) -> Result<(), DevsetupError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), DevsetupError>;
    fn remove_file(&self, path: &Path) -> Result<(), DevsetupError>;
    /// Files directly inside `path`. A missing directory lists as empty.
    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, DevsetupError>;
    fn exists(&self, path: &Path) -> bool;
}

/// Line-oriented operator I/O. `read_line` returns `None` at end of input.
pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), DevsetupError>;
    fn read_line(&self, prompt: &str) -> Result<Option<String>, DevsetupError>;
}

pub struct ProductionClock;

impl Clock for ProductionClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DevsetupError> {
        std::fs::read_to_string(path).map_err(|e| DevsetupError::Io(e.to_string()))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), DevsetupError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DevsetupError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| DevsetupError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), DevsetupError> {
        std::fs::create_dir_all(path).map_err(|e| DevsetupError::Io(e.to_string()))
    }

    fn remove_file(&self, path: &Path) -> Result<(), DevsetupError> {
        std::fs::remove_file(path).map_err(|e| DevsetupError::Io(e.to_string()))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, DevsetupError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(path).map_err(|e| DevsetupError::Io(e.to_string()))?;
        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Default)]
struct ProcessState {
    next_handle: u64,
    children: HashMap<u64, std::process::Child>,
}

pub struct ProductionProcessRunner {
    state: Mutex<ProcessState>,
}

impl ProductionProcessRunner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProcessState::default()),
        }
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ProcessState>, DevsetupError> {
        self.state
            .lock()
            .map_err(|_| DevsetupError::Process("process lock poisoned".to_string()))
    }
}

impl Default for ProductionProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner for ProductionProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, DevsetupError> {
        let mut cmd = std::process::Command::new(&request.program);
        cmd.args(&request.args);
        cmd.stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| DevsetupError::Process(format!("{}: {e}", request.program)))?;
        let mut state = self.lock_state()?;
        let handle = state.next_handle;
        state.next_handle += 1;
        state.children.insert(handle, child);
        Ok(handle)
    }

    fn wait(&self, handle: u64) -> Result<ProcessOutput, DevsetupError> {
        let child = self.lock_state()?.children.remove(&handle);
        let child =
            child.ok_or_else(|| DevsetupError::Process(format!("unknown handle {handle}")))?;
        let output = child
            .wait_with_output()
            .map_err(|e| DevsetupError::Process(e.to_string()))?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), DevsetupError> {
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| DevsetupError::Io(e.to_string()))
    }

    fn read_line(&self, prompt: &str) -> Result<Option<String>, DevsetupError> {
        let mut out = std::io::stdout();
        write!(out, "{prompt}").map_err(|e| DevsetupError::Io(e.to_string()))?;
        out.flush().map_err(|e| DevsetupError::Io(e.to_string()))?;

        let mut buffer = String::new();
        let read = std::io::stdin()
            .read_line(&mut buffer)
            .map_err(|e| DevsetupError::Io(e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.trim_end_matches(['\r', '\n']).to_string()))
    }
}

pub struct ProductionRuntime {
    pub clock: Arc<dyn Clock>,
    pub file_system: Arc<dyn FileSystem>,
    pub process_runner: Arc<dyn ProcessRunner>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ProductionClock),
            file_system: Arc::new(ProductionFileSystem),
            process_runner: Arc::new(ProductionProcessRunner::new()),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<SystemTime>>,
}

impl FakeClock {
    pub fn new(now: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("clock lock")
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<DevsetupError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files.lock().expect("files lock").get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    pub fn set_fail_next(&self, error: DevsetupError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    fn maybe_fail(&self) -> Result<(), DevsetupError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, DevsetupError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| DevsetupError::Io(format!("missing file {}", path.display())))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), DevsetupError> {
        self.maybe_fail()?;
        let mut files = self.files.lock().expect("files lock");
        let contents = files.entry(path.to_path_buf()).or_default();
        contents.push_str(line);
        contents.push('\n');
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), DevsetupError> {
        self.maybe_fail()?;
        self.dirs.lock().expect("dirs lock").push(path.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<(), DevsetupError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| DevsetupError::Io(format!("missing file {}", path.display())))
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<PathBuf>, DevsetupError> {
        self.maybe_fail()?;
        Ok(self
            .files
            .lock()
            .expect("files lock")
            .keys()
            .filter(|file| file.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

#[derive(Default, Clone)]
pub struct FakeTerminal {
    pub is_tty: bool,
    writes: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    inputs: Arc<Mutex<VecDeque<String>>>,
    broken_on: Arc<Mutex<Option<String>>>,
}

impl FakeTerminal {
    pub fn new(is_tty: bool) -> Self {
        Self {
            is_tty,
            ..Self::default()
        }
    }

    /// Queues operator answers; once exhausted, `read_line` reports end of input.
    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terminal = Self::new(true);
        terminal
            .inputs
            .lock()
            .expect("inputs lock")
            .extend(inputs.into_iter().map(Into::into));
        terminal
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    /// Every later `write_line` containing `needle` fails like a closed pipe.
    pub fn break_writes_containing(&self, needle: impl Into<String>) {
        *self.broken_on.lock().expect("broken lock") = Some(needle.into());
    }
}

impl Terminal for FakeTerminal {
    fn stdin_is_tty(&self) -> bool {
        self.is_tty
    }

    fn write_line(&self, line: &str) -> Result<(), DevsetupError> {
        if let Some(needle) = self.broken_on.lock().expect("broken lock").as_deref() {
            if line.contains(needle) {
                return Err(DevsetupError::Io("Broken pipe (os error 32)".to_string()));
            }
        }
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        Ok(())
    }

    fn read_line(&self, prompt: &str) -> Result<Option<String>, DevsetupError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(self.inputs.lock().expect("inputs lock").pop_front())
    }
}

#[derive(Default, Clone)]
pub struct FakeProcessRunner {
    responses: Arc<Mutex<VecDeque<Result<ProcessOutput, DevsetupError>>>>,
    spawned: Arc<Mutex<Vec<ProcessRequest>>>,
    next_handle: Arc<Mutex<u64>>,
}

impl FakeProcessRunner {
    pub fn push_response(&self, output: Result<ProcessOutput, DevsetupError>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(output);
    }

    pub fn push_exit(&self, exit_code: i32, stdout: &str) {
        self.push_response(Ok(ProcessOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
    }

    pub fn spawned(&self) -> Vec<ProcessRequest> {
        self.spawned.lock().expect("spawned lock").clone()
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.lock().expect("responses lock").len()
    }
}

impl ProcessRunner for FakeProcessRunner {
    fn spawn(&self, request: ProcessRequest) -> Result<u64, DevsetupError> {
        self.spawned.lock().expect("spawned lock").push(request);
        let mut next = self.next_handle.lock().expect("next lock");
        let handle = *next;
        *next += 1;
        Ok(handle)
    }

    fn wait(&self, _handle: u64) -> Result<ProcessOutput, DevsetupError> {
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(DevsetupError::Process(
                    "no fake response queued".to_string(),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_file_system_appends_lines_in_order() {
        let fs = FakeFileSystem::default();
        let path = Path::new("/state/undo-1.log");
        fs.append_line(path, "first").expect("append first");
        fs.append_line(path, "second").expect("append second");
        assert_eq!(fs.contents(path).as_deref(), Some("first\nsecond\n"));
    }

    #[test]
    fn fake_file_system_lists_only_direct_children() {
        let fs = FakeFileSystem::default();
        fs.insert("/state/a.log", "");
        fs.insert("/state/nested/b.log", "");
        fs.insert("/other/c.log", "");
        let listed = fs.list_dir(Path::new("/state")).expect("list");
        assert_eq!(listed, vec![PathBuf::from("/state/a.log")]);
    }

    #[test]
    fn fake_terminal_reports_end_of_input_after_queue_drains() {
        let terminal = FakeTerminal::with_inputs(["y"]);
        assert_eq!(terminal.read_line("? ").expect("read"), Some("y".to_string()));
        assert_eq!(terminal.read_line("? ").expect("read"), None);
        assert_eq!(terminal.prompts().len(), 2);
    }

    #[test]
    fn fake_terminal_fails_only_matching_writes() {
        let terminal = FakeTerminal::new(false);
        terminal.break_writes_containing("[ok]");
        assert!(terminal.write_line("[ok] a").is_err());
        terminal.write_line("[failed] b").expect("write");
        assert_eq!(terminal.written_lines(), vec!["[failed] b".to_string()]);
    }

    #[test]
    fn fake_process_runner_errors_when_queue_is_empty() {
        let runner = FakeProcessRunner::default();
        let err = runner
            .run(ProcessRequest::new("true", Vec::<String>::new()))
            .expect_err("empty queue");
        assert!(matches!(err, DevsetupError::Process(_)));
        assert_eq!(runner.spawned().len(), 1);
    }

    #[test]
    fn production_runner_captures_exit_code_and_stdout() {
        let runner = ProductionProcessRunner::new();
        let out = runner
            .run(ProcessRequest::new("sh", ["-c", "printf hello; exit 3"]))
            .expect("run sh");
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout, "hello");
        assert!(!out.success());
    }
}
