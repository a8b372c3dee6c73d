//! Package installation
//!
//! Table-driven mapping from a logical package name to the argv of the
//! detected package manager. Installing does not check whether the package
//! is already present; callers test for the tool first and managers treat a
//! repeated install as a no-op or upgrade.

use super::executor::{CommandResult, CommandRunner, CommandSpec};
use super::profile::{EnvironmentProfile, PackageManager};
use tracing::{error, info, warn};

/// Install argv for `package` with `manager`
pub fn install_argv(manager: PackageManager, package: &str) -> Vec<String> {
    let head: &[&str] = match manager {
        PackageManager::Apt => &["apt-get", "install", "-y"],
        PackageManager::Dnf => &["dnf", "install", "-y"],
        PackageManager::Yum => &["yum", "install", "-y"],
        PackageManager::Pacman => &["pacman", "-S", "--noconfirm"],
        PackageManager::Zypper => &["zypper", "install", "-y"],
        PackageManager::Apk => &["apk", "add"],
        PackageManager::Brew => &["brew", "install"],
    };
    head.iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(package.to_string()))
        .collect()
}

/// Commands for a full system upgrade, issued in order
pub fn upgrade_argvs(manager: PackageManager) -> Vec<Vec<String>> {
    let steps: &[&[&str]] = match manager {
        PackageManager::Apt => &[&["apt-get", "update"], &["apt-get", "upgrade", "-y"]],
        PackageManager::Dnf => &[&["dnf", "upgrade", "-y"]],
        PackageManager::Yum => &[&["yum", "update", "-y"]],
        PackageManager::Pacman => &[&["pacman", "-Syu", "--noconfirm"]],
        PackageManager::Zypper => &[&["zypper", "update", "-y"]],
        PackageManager::Apk => &[&["apk", "update"], &["apk", "upgrade"]],
        PackageManager::Brew => &[&["brew", "update"], &["brew", "upgrade"]],
    };
    steps
        .iter()
        .map(|step| step.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// Read-only listing of pending upgrades
pub fn list_upgradable_argv(manager: PackageManager) -> Vec<String> {
    let argv: &[&str] = match manager {
        PackageManager::Apt => &["apt", "list", "--upgradable"],
        PackageManager::Dnf => &["dnf", "check-update"],
        PackageManager::Yum => &["yum", "check-update"],
        PackageManager::Pacman => &["pacman", "-Qu"],
        PackageManager::Zypper => &["zypper", "list-updates"],
        PackageManager::Apk => &["apk", "version", "-l", "<"],
        PackageManager::Brew => &["brew", "outdated"],
    };
    argv.iter().map(|s| s.to_string()).collect()
}

/// Outcome of an install attempt
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(CommandResult),
    Failed(CommandResult),
    NoPackageManager,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, InstallOutcome::Installed(_))
    }

    pub fn describe(&self, package: &str) -> String {
        match self {
            InstallOutcome::Installed(_) => format!("Installed {}", package),
            InstallOutcome::Failed(result) => {
                format!("Could not install {}: {}", package, result.error_summary())
            }
            InstallOutcome::NoPackageManager => {
                format!("Could not install {}: no supported package manager", package)
            }
        }
    }
}

/// Drives installs through a [`CommandRunner`]
pub struct PackageInstaller<'a> {
    runner: &'a dyn CommandRunner,
    timeout_secs: u64,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(runner: &'a dyn CommandRunner, timeout_secs: u64) -> Self {
        Self {
            runner,
            timeout_secs,
        }
    }

    /// Install `package`; true on success
    pub fn install(&self, package: &str, profile: &EnvironmentProfile) -> bool {
        self.try_install(package, profile).succeeded()
    }

    pub fn try_install(&self, package: &str, profile: &EnvironmentProfile) -> InstallOutcome {
        let Some(manager) = profile.package_manager() else {
            error!("Cannot install {}: no package manager detected", package);
            return InstallOutcome::NoPackageManager;
        };

        info!("Installing {} with {}", package, manager.as_str());
        let mut spec = CommandSpec::new(install_argv(manager, package)).timeout(self.timeout_secs);
        if manager.needs_elevation() {
            spec = spec.elevated();
        }

        let result = self.runner.execute(&spec, profile);
        if result.success() {
            InstallOutcome::Installed(result)
        } else {
            warn!("Installing {} failed: {}", package, result.error_summary());
            InstallOutcome::Failed(result)
        }
    }
}
