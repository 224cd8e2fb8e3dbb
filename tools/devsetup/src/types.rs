use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerKind {
    Brew,
    Apt,
    Dnf,
    Pacman,
}

impl PackageManagerKind {
    /// Probe order when the config does not pin a manager.
    pub const DETECTION_ORDER: [PackageManagerKind; 4] = [Self::Brew, Self::Apt, Self::Dnf, Self::Pacman];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    /// The executable whose presence on PATH identifies this manager.
    pub fn probe_binary(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Apt => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
        }
    }

    pub fn needs_root(self) -> bool {
        !matches!(self, Self::Brew)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeScope {
    pub state_dir: PathBuf,
    pub audit_log: PathBuf,
}
