use crate::errors::DevsetupError;
use crate::runtime::FileSystem;
use std::path::{Path, PathBuf};

/// One recorded command and the physical line it came from (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub line_number: usize,
    pub command: String,
}

/// Handle to a single undo log file, scoped to one setup or uninstall run.
pub struct UndoLog<'a> {
    path: PathBuf,
    fs: &'a dyn FileSystem,
}

impl<'a> UndoLog<'a> {
    pub fn new(path: impl Into<PathBuf>, fs: &'a dyn FileSystem) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.fs.exists(&self.path)
    }

    pub fn ensure_parent(&self) -> Result<(), DevsetupError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.fs.create_dir_all(parent),
            _ => Ok(()),
        }
    }

    pub fn append(&self, command: &str) -> Result<(), DevsetupError> {
        self.fs.append_line(&self.path, command)
    }

    pub fn load(&self) -> Result<Vec<UndoEntry>, DevsetupError> {
        if !self.exists() {
            return Err(DevsetupError::UndoLogNotFound(
                self.path.display().to_string(),
            ));
        }
        let raw = self.fs.read_to_string(&self.path)?;
        Ok(parse_entries(&raw))
    }

    pub fn remove(&self) -> Result<(), DevsetupError> {
        self.fs.remove_file(&self.path)
    }
}

pub fn parse_entries(raw: &str) -> Vec<UndoEntry> {
    raw.lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let command = line.trim_end_matches('\r');
            if command.trim().is_empty() {
                return None;
            }
            Some(UndoEntry {
                line_number: idx + 1,
                command: command.to_string(),
            })
        })
        .collect()
}
