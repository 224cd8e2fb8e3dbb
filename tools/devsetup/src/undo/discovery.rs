//! Finding undo logs by name: `undo-<unix-seconds>.log`, or
//! `undo-<unix-seconds>-<n>.log` when a second run lands in the same second.

use crate::errors::DevsetupError;
use crate::prompt::choose;
use crate::runtime::{Clock, FileSystem, Terminal};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const PREFIX: &str = "undo-";
const SUFFIX: &str = ".log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoLogCandidate {
    pub path: PathBuf,
    pub timestamp: u64,
    pub sequence: u32,
}

pub fn parse_log_name(file_name: &str) -> Option<(u64, u32)> {
    let stem = file_name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    let (secs, seq) = match stem.split_once('-') {
        Some((secs, seq)) => (secs, seq.parse::<u32>().ok()?),
        None => (stem, 0),
    };
    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((secs.parse().ok()?, seq))
}

/// Path for a new run's log; never one that already exists.
pub fn new_log_path(dir: &Path, clock: &dyn Clock, fs: &dyn FileSystem) -> PathBuf {
    let secs = clock
        .now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut path = dir.join(format!("{PREFIX}{secs}{SUFFIX}"));
    let mut seq = 1u32;
    while fs.exists(&path) {
        path = dir.join(format!("{PREFIX}{secs}-{seq}{SUFFIX}"));
        seq += 1;
    }
    path
}

/// Candidates in `dir`, most recent first.
pub fn discover(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<UndoLogCandidate>, DevsetupError> {
    let mut candidates = fs
        .list_dir(dir)?
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let (timestamp, sequence) = parse_log_name(name)?;
            Some(UndoLogCandidate {
                path,
                timestamp,
                sequence,
            })
        })
        .collect::<Vec<_>>();
    candidates.sort_by(|a, b| {
        (b.timestamp, b.sequence, &b.path).cmp(&(a.timestamp, a.sequence, &a.path))
    });
    Ok(candidates)
}

/// Picks one log: the only candidate automatically, otherwise by asking.
pub fn select(
    candidates: &[UndoLogCandidate],
    dir: &Path,
    terminal: &dyn Terminal,
) -> Result<PathBuf, DevsetupError> {
    match candidates {
        [] => Err(DevsetupError::NoUndoLogs(dir.display().to_string())),
        [only] => {
            terminal.write_line(&format!("Using undo log {}", only.path.display()))?;
            Ok(only.path.clone())
        }
        many => {
            let labels = many
                .iter()
                .map(|c| c.path.display().to_string())
                .collect::<Vec<_>>();
            let idx = choose(terminal, "Several undo logs found (newest first):", &labels)?;
            Ok(many[idx].path.clone())
        }
    }
}
