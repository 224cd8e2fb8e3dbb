//! Undo log record and replay.
//!
//! # Overview
//!
//! A setup run appends one shell command per successful mutation to an undo
//! log: the command that puts the machine back the way it was before that
//! mutation. An uninstall run loads the log, asks the operator once, then runs
//! every entry in file order and reports how many succeeded and failed.
//!
//! The log is plain text, one command per line, no header. Blank lines are
//! ignored on load. The file is only ever appended to while recording and only
//! ever read while replaying.

pub mod discovery;
pub mod log;
pub mod recorder;
pub mod replayer;
