//! Host environment snapshot
//!
//! An [`EnvironmentProfile`] is built once at startup by the detector and is
//! read-only afterwards. Everything downstream (executor, installer, backup
//! guard) is a pure function of the profile, so tests construct profiles
//! directly instead of needing a real root session.

use serde::{Deserialize, Serialize};

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    Linux,
    Macos,
    Windows,
    Other,
}

impl OsKind {
    /// Map a `std::env::consts::OS` style name to an OS kind
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "linux" => OsKind::Linux,
            "macos" => OsKind::Macos,
            "windows" => OsKind::Windows,
            _ => OsKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsKind::Linux => "linux",
            OsKind::Macos => "macos",
            OsKind::Windows => "windows",
            OsKind::Other => "other",
        }
    }
}

/// Supported package managers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Zypper,
    Apk,
    Brew,
}

impl PackageManager {
    /// Probe order on Linux. Some distros ship compatibility shims for other
    /// managers (e.g. `yum` on Fedora), so the primary manager must come first.
    pub const LINUX_PROBE_ORDER: [PackageManager; 6] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Yum,
        PackageManager::Pacman,
        PackageManager::Zypper,
        PackageManager::Apk,
    ];

    pub fn all() -> &'static [PackageManager] {
        &[
            PackageManager::Apt,
            PackageManager::Dnf,
            PackageManager::Yum,
            PackageManager::Pacman,
            PackageManager::Zypper,
            PackageManager::Apk,
            PackageManager::Brew,
        ]
    }

    /// Binary looked up on the search path to detect this manager
    pub fn probe_binary(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Pacman => "pacman",
            PackageManager::Zypper => "zypper",
            PackageManager::Apk => "apk",
            PackageManager::Brew => "brew",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.probe_binary()
    }

    /// Homebrew refuses to run as root; everything else installs system-wide
    pub fn needs_elevation(&self) -> bool {
        !matches!(self, PackageManager::Brew)
    }
}

/// Service manager, resolved per unit (see `system::services`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceManager {
    Systemd,
    SysvService,
    None,
}

impl ServiceManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceManager::Systemd => "systemd",
            ServiceManager::SysvService => "service",
            ServiceManager::None => "none",
        }
    }
}

/// User intent for simulation
///
/// Non-Linux hosts are always simulated no matter what is requested here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimulationMode {
    /// Simulate only when the host is not Linux
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Always simulate
    #[serde(rename = "on")]
    Simulate,
    /// Execute for real (honoured on Linux only)
    #[serde(rename = "off")]
    ForceReal,
}

impl SimulationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationMode::Auto => "auto",
            SimulationMode::Simulate => "on",
            SimulationMode::ForceReal => "off",
        }
    }
}

/// Immutable snapshot of the host this process runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentProfile {
    os_kind: OsKind,
    distro_id: String,
    package_manager: Option<PackageManager>,
    is_privileged: bool,
    elevation_available: bool,
    is_simulated: bool,
}

impl EnvironmentProfile {
    pub fn new(
        os_kind: OsKind,
        distro_id: impl Into<String>,
        package_manager: Option<PackageManager>,
        is_privileged: bool,
        elevation_available: bool,
        mode: SimulationMode,
    ) -> Self {
        Self {
            os_kind,
            distro_id: distro_id.into(),
            package_manager,
            is_privileged,
            elevation_available,
            is_simulated: resolve_simulation(os_kind, mode),
        }
    }

    pub fn os_kind(&self) -> OsKind {
        self.os_kind
    }

    pub fn distro_id(&self) -> &str {
        &self.distro_id
    }

    pub fn package_manager(&self) -> Option<PackageManager> {
        self.package_manager
    }

    pub fn is_privileged(&self) -> bool {
        self.is_privileged
    }

    pub fn elevation_available(&self) -> bool {
        self.elevation_available
    }

    pub fn is_simulated(&self) -> bool {
        self.is_simulated
    }

    /// One-line description for the status bar and `--detect`
    pub fn summary(&self) -> String {
        let distro = if self.distro_id.is_empty() {
            "?"
        } else {
            self.distro_id.as_str()
        };
        let pm = self.package_manager.map_or("no package manager", |p| p.as_str());
        let user = if self.is_privileged { "root" } else { "user" };
        let mode = if self.is_simulated { "SIMULATION" } else { "LIVE" };
        format!(
            "{}/{} · {} · {} · {}",
            self.os_kind.as_str(),
            distro,
            pm,
            user,
            mode
        )
    }
}

/// Decide whether commands must be simulated.
///
/// Anything that is not Linux is simulated unconditionally, so a forced
/// real mode can never reach a development machine.
pub fn resolve_simulation(os_kind: OsKind, mode: SimulationMode) -> bool {
    if os_kind != OsKind::Linux {
        return true;
    }
    matches!(mode, SimulationMode::Simulate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_linux_always_simulated() {
        for os in [OsKind::Macos, OsKind::Windows, OsKind::Other] {
            assert!(resolve_simulation(os, SimulationMode::Auto));
            assert!(resolve_simulation(os, SimulationMode::ForceReal));
            assert!(resolve_simulation(os, SimulationMode::Simulate));
        }
    }

    #[test]
    fn test_linux_simulation_follows_mode() {
        assert!(!resolve_simulation(OsKind::Linux, SimulationMode::Auto));
        assert!(!resolve_simulation(OsKind::Linux, SimulationMode::ForceReal));
        assert!(resolve_simulation(OsKind::Linux, SimulationMode::Simulate));
    }

    #[test]
    fn test_windows_profile_without_flag_is_simulated() {
        let profile = EnvironmentProfile::new(
            OsKind::Windows,
            "windows",
            None,
            false,
            false,
            SimulationMode::default(),
        );
        assert!(profile.is_simulated());
    }

    #[test]
    fn test_os_kind_from_name() {
        assert_eq!(OsKind::from_os_name("linux"), OsKind::Linux);
        assert_eq!(OsKind::from_os_name("macos"), OsKind::Macos);
        assert_eq!(OsKind::from_os_name("windows"), OsKind::Windows);
        assert_eq!(OsKind::from_os_name("freebsd"), OsKind::Other);
    }

    #[test]
    fn test_summary_mentions_mode() {
        let profile = EnvironmentProfile::new(
            OsKind::Linux,
            "debian",
            Some(PackageManager::Apt),
            true,
            true,
            SimulationMode::Auto,
        );
        let summary = profile.summary();
        assert!(summary.contains("debian"));
        assert!(summary.contains("apt"));
        assert!(summary.contains("root"));
        assert!(summary.contains("LIVE"));
    }

    #[test]
    fn test_simulation_mode_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: SimulationMode,
        }
        let w: Wrapper = toml::from_str("mode = \"off\"").unwrap();
        assert_eq!(w.mode, SimulationMode::ForceReal);
        let w: Wrapper = toml::from_str("mode = \"on\"").unwrap();
        assert_eq!(w.mode, SimulationMode::Simulate);
    }
}
