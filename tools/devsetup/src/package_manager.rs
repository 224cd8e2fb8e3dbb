use crate::errors::DevsetupError;
use crate::logging::append_run_log;
use crate::preflight::tool_available;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::shell;
use crate::types::PackageManagerKind;
use serde_json::json;

pub struct PackageManager<'a> {
    runner: &'a dyn ProcessRunner,
    kind: PackageManagerKind,
    use_sudo: bool,
}

impl<'a> PackageManager<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, kind: PackageManagerKind, use_sudo: bool) -> Self {
        Self {
            runner,
            kind,
            use_sudo,
        }
    }

    /// Uses `configured` when given (it must be installed), otherwise the
    /// first manager in [`PackageManagerKind::DETECTION_ORDER`] found on PATH.
    pub fn detect(
        runner: &'a dyn ProcessRunner,
        configured: Option<PackageManagerKind>,
        use_sudo: bool,
    ) -> Result<Self, DevsetupError> {
        if let Some(kind) = configured {
            if !tool_available(runner, kind.probe_binary()) {
                return Err(DevsetupError::MissingTool(kind.probe_binary().to_string()));
            }
            return Ok(Self::new(runner, kind, use_sudo));
        }

        for kind in PackageManagerKind::DETECTION_ORDER {
            if tool_available(runner, kind.probe_binary()) {
                append_run_log(
                    "info",
                    "package_manager.detected",
                    json!({ "kind": kind.as_str() }),
                );
                return Ok(Self::new(runner, kind, use_sudo));
            }
        }

        Err(DevsetupError::MissingTool(format!(
            "package manager (one of {})",
            PackageManagerKind::DETECTION_ORDER
                .iter()
                .map(|k| k.probe_binary())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    pub fn kind(&self) -> PackageManagerKind {
        self.kind
    }

    pub fn is_installed(&self, package: &str) -> Result<bool, DevsetupError> {
        let argv = self.query_argv(package);
        let out = self.runner.run(to_request(&argv))?;
        append_run_log(
            "debug",
            "package_manager.query",
            json!({
                "package": package,
                "installed": out.success(),
                "exit_code": out.exit_code,
            }),
        );
        Ok(out.success())
    }

    pub fn install(&self, package: &str) -> Result<ProcessOutput, DevsetupError> {
        let argv = self.install_argv(package);
        append_run_log(
            "info",
            "package_manager.install.started",
            json!({ "package": package, "command": argv.join(" ") }),
        );
        let out = self.runner.run(to_request(&argv))?;
        append_run_log(
            if out.success() { "info" } else { "warn" },
            "package_manager.install.finished",
            json!({
                "package": package,
                "exit_code": out.exit_code,
                "stderr": out.stderr,
            }),
        );
        Ok(out)
    }

    /// The shell command that reverses a successful `install(package)`.
    pub fn remove_command(&self, package: &str) -> String {
        let argv = self.remove_argv(package);
        shell::join(argv.iter().map(String::as_str))
    }

    fn query_argv(&self, package: &str) -> Vec<String> {
        let base: &[&str] = match self.kind {
            PackageManagerKind::Brew => &["brew", "list", "--versions"],
            PackageManagerKind::Apt => &["dpkg", "-s"],
            PackageManagerKind::Dnf => &["rpm", "-q"],
            PackageManagerKind::Pacman => &["pacman", "-Q"],
        };
        with_package(base, package)
    }

    fn install_argv(&self, package: &str) -> Vec<String> {
        let base: &[&str] = match self.kind {
            PackageManagerKind::Brew => &["brew", "install"],
            PackageManagerKind::Apt => &["apt-get", "install", "-y"],
            PackageManagerKind::Dnf => &["dnf", "install", "-y"],
            PackageManagerKind::Pacman => &["pacman", "-S", "--noconfirm"],
        };
        self.privileged(with_package(base, package))
    }

    fn remove_argv(&self, package: &str) -> Vec<String> {
        let base: &[&str] = match self.kind {
            PackageManagerKind::Brew => &["brew", "uninstall"],
            PackageManagerKind::Apt => &["apt-get", "remove", "-y"],
            PackageManagerKind::Dnf => &["dnf", "remove", "-y"],
            PackageManagerKind::Pacman => &["pacman", "-R", "--noconfirm"],
        };
        self.privileged(with_package(base, package))
    }

    fn privileged(&self, mut argv: Vec<String>) -> Vec<String> {
        if self.use_sudo && self.kind.needs_root() {
            argv.insert(0, "sudo".to_string());
        }
        argv
    }
}

fn with_package(base: &[&str], package: &str) -> Vec<String> {
    base.iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(package.to_string()))
        .collect()
}

fn to_request(argv: &[String]) -> ProcessRequest {
    ProcessRequest::new(&argv[0], argv[1..].iter().cloned())
}
