use crate::errors::DevsetupError;
use crate::runtime::FileSystem;
use crate::types::{PackageManagerKind, RuntimeScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type EnvMap = BTreeMap<String, String>;

pub const APP_DIR_NAME: &str = "devsetup";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub packages: PackagesConfig,
    pub package_manager: PackageManagerConfig,
    pub git: GitSettingsConfig,
    pub state: StateConfig,
    pub setup: SetupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackagesConfig {
    pub install: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManagerConfig {
    pub kind: Option<PackageManagerKind>,
    pub use_sudo: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitSettingsConfig {
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    pub dir: Option<PathBuf>,
    pub audit_log: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetupConfig {
    pub force: bool,
    pub dry_run: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = [
            ("init.defaultBranch", "main"),
            ("pull.rebase", "true"),
            ("push.autoSetupRemote", "true"),
            ("core.autocrlf", "input"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        Self {
            packages: PackagesConfig {
                install: ["git", "ripgrep", "fd", "jq", "tmux"]
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            package_manager: PackageManagerConfig {
                kind: None,
                use_sudo: true,
            },
            git: GitSettingsConfig { settings },
            state: StateConfig {
                dir: None,
                audit_log: "audit.jsonl".to_string(),
            },
            setup: SetupConfig {
                force: false,
                dry_run: false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialAppConfig {
    packages: Option<PartialPackagesConfig>,
    package_manager: Option<PartialPackageManagerConfig>,
    git: Option<PartialGitSettingsConfig>,
    state: Option<PartialStateConfig>,
    setup: Option<PartialSetupConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPackagesConfig {
    install: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPackageManagerConfig {
    kind: Option<PackageManagerKind>,
    use_sudo: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialGitSettingsConfig {
    settings: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStateConfig {
    dir: Option<PathBuf>,
    audit_log: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSetupConfig {
    force: Option<bool>,
    dry_run: Option<bool>,
}

pub fn load_config(
    overrides: &CliOverrides,
    env: &EnvMap,
    fs: &dyn FileSystem,
) -> Result<(AppConfig, RuntimeScope), DevsetupError> {
    let mut cfg = AppConfig::default();

    let config_path = match &overrides.config_path {
        Some(path) => Some(path.clone()),
        None => default_config_path(env).filter(|path| fs.exists(path)),
    };
    if let Some(path) = config_path {
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| DevsetupError::ConfigParse(format!("{}: {e}", path.display())))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;

    let scope = resolve_scope(&cfg, overrides, env)?;
    Ok((cfg, scope))
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(packages) = partial.packages {
        if let Some(install) = packages.install {
            cfg.packages.install = install;
        }
    }

    if let Some(manager) = partial.package_manager {
        if let Some(kind) = manager.kind {
            cfg.package_manager.kind = Some(kind);
        }
        if let Some(use_sudo) = manager.use_sudo {
            cfg.package_manager.use_sudo = use_sudo;
        }
    }

    if let Some(git) = partial.git {
        if let Some(settings) = git.settings {
            cfg.git.settings = settings;
        }
    }

    if let Some(state) = partial.state {
        if let Some(dir) = state.dir {
            cfg.state.dir = Some(dir);
        }
        if let Some(audit_log) = state.audit_log {
            cfg.state.audit_log = audit_log;
        }
    }

    if let Some(setup) = partial.setup {
        if let Some(force) = setup.force {
            cfg.setup.force = force;
        }
        if let Some(dry_run) = setup.dry_run {
            cfg.setup.dry_run = dry_run;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(dir) = &overrides.state_dir {
        cfg.state.dir = Some(dir.clone());
    }
    if overrides.force {
        cfg.setup.force = true;
    }
    if overrides.dry_run {
        cfg.setup.dry_run = true;
    }
}

fn default_config_path(env: &EnvMap) -> Option<PathBuf> {
    if let Some(xdg) = env.get("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join(APP_DIR_NAME).join("config.toml"));
    }
    env.get("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join(APP_DIR_NAME).join("config.toml"))
}

pub fn resolve_scope(
    cfg: &AppConfig,
    overrides: &CliOverrides,
    env: &EnvMap,
) -> Result<RuntimeScope, DevsetupError> {
    let state_dir = if let Some(dir) = &overrides.state_dir {
        dir.clone()
    } else if let Some(dir) = &cfg.state.dir {
        dir.clone()
    } else if let Some(xdg) = env.get("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        PathBuf::from(xdg).join(APP_DIR_NAME)
    } else if let Some(home) = env.get("HOME").filter(|v| !v.is_empty()) {
        PathBuf::from(home)
            .join(".local")
            .join("state")
            .join(APP_DIR_NAME)
    } else {
        return Err(DevsetupError::InvalidConfig(
            "cannot resolve state directory: set --state-dir, state.dir, XDG_STATE_HOME or HOME"
                .to_string(),
        ));
    };

    let audit_log = absolutize_path(&state_dir, Path::new(&cfg.state.audit_log));
    Ok(RuntimeScope {
        state_dir,
        audit_log,
    })
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), DevsetupError> {
    for name in &cfg.packages.install {
        if name.trim().is_empty() {
            return Err(DevsetupError::InvalidConfig(
                "packages.install entries must not be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(DevsetupError::InvalidConfig(format!(
                "package name `{name}` must not contain whitespace"
            )));
        }
    }

    for (key, value) in &cfg.git.settings {
        if value.contains(['\n', '\r']) {
            return Err(DevsetupError::InvalidConfig(format!(
                "git setting `{key}` must be a single line"
            )));
        }
        let valid = key
            .split_once('.')
            .map(|(section, name)| !section.is_empty() && !name.is_empty())
            .unwrap_or(false);
        if !valid || key.chars().any(char::is_whitespace) {
            return Err(DevsetupError::InvalidConfig(format!(
                "git setting `{key}` must have the form section.name"
            )));
        }
    }

    if cfg.state.audit_log.trim().is_empty() {
        return Err(DevsetupError::InvalidConfig(
            "state.audit_log must not be empty".to_string(),
        ));
    }

    Ok(())
}
