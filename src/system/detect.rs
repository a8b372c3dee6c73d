//! Host environment detection
//!
//! Probes the host once at startup and builds an [`EnvironmentProfile`].
//! Detection never fails: every probe degrades to an "unknown" value so the
//! dashboard always gets a usable (if degraded) profile.

use super::privilege;
use super::profile::{EnvironmentProfile, OsKind, PackageManager, SimulationMode};
use std::fs;
use tracing::{debug, info, warn};

const OS_RELEASE_PATH: &str = "/etc/os-release";
const UNKNOWN_LINUX: &str = "unknown_linux";

/// Everything the detector needs to know about the host.
///
/// The live implementation reads the real system; tests substitute a fake.
pub trait HostProbe {
    fn os_name(&self) -> String;
    fn os_release(&self) -> Option<String>;
    fn has_executable(&self, name: &str) -> bool;
    fn is_privileged(&self) -> bool;
}

/// Probe backed by the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveHost;

impl HostProbe for LiveHost {
    fn os_name(&self) -> String {
        std::env::consts::OS.to_string()
    }

    fn os_release(&self) -> Option<String> {
        match fs::read_to_string(OS_RELEASE_PATH) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!("Cannot read {}: {}", OS_RELEASE_PATH, e);
                None
            }
        }
    }

    fn has_executable(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }

    #[cfg(unix)]
    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(not(unix))]
    fn is_privileged(&self) -> bool {
        false
    }
}

/// Builds the environment profile from a host probe
pub struct EnvironmentDetector<P: HostProbe = LiveHost> {
    probe: P,
}

impl EnvironmentDetector<LiveHost> {
    pub fn new() -> Self {
        Self { probe: LiveHost }
    }
}

impl<P: HostProbe> EnvironmentDetector<P> {
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }

    /// Probe the host and produce a profile
    pub fn detect(&self, mode: SimulationMode) -> EnvironmentProfile {
        let os_name = self.probe.os_name();
        let os_kind = OsKind::from_os_name(&os_name);
        let distro_id = self.detect_distro(os_kind, &os_name);
        let package_manager = self.detect_package_manager(os_kind);
        let is_privileged = self.probe.is_privileged();
        let elevation_available = self.probe.has_executable(privilege::ELEVATION_TOOL);

        if os_kind != OsKind::Linux && mode == SimulationMode::ForceReal {
            warn!(
                "Real execution requested on {}; refusing and staying in simulation mode",
                os_name
            );
        }

        let profile = EnvironmentProfile::new(
            os_kind,
            distro_id,
            package_manager,
            is_privileged,
            elevation_available,
            mode,
        );

        info!(
            os = os_kind.as_str(),
            distro = profile.distro_id(),
            package_manager = package_manager.map_or("none", |p| p.as_str()),
            privileged = is_privileged,
            simulated = profile.is_simulated(),
            "Environment detected"
        );

        profile
    }

    fn detect_distro(&self, os_kind: OsKind, os_name: &str) -> String {
        match os_kind {
            OsKind::Linux => self
                .probe
                .os_release()
                .and_then(|content| parse_os_release_id(&content))
                .unwrap_or_else(|| {
                    warn!("Could not determine Linux distribution, continuing as {}", UNKNOWN_LINUX);
                    UNKNOWN_LINUX.to_string()
                }),
            OsKind::Macos => "macos".to_string(),
            OsKind::Windows => "windows".to_string(),
            OsKind::Other => os_name.to_lowercase(),
        }
    }

    fn detect_package_manager(&self, os_kind: OsKind) -> Option<PackageManager> {
        let mut candidates: Vec<PackageManager> = PackageManager::LINUX_PROBE_ORDER.to_vec();
        if os_kind == OsKind::Macos {
            candidates.push(PackageManager::Brew);
        }

        let found = candidates
            .into_iter()
            .find(|pm| self.probe.has_executable(pm.probe_binary()));

        match found {
            Some(pm) => debug!("Package manager detected: {}", pm.as_str()),
            None => warn!("No supported package manager found"),
        }
        found
    }
}

impl Default for EnvironmentDetector<LiveHost> {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the `ID=` field from os-release content.
///
/// Handles both `ID=value` and `ID="value"`. Returns None when the field is
/// missing or empty.
pub fn parse_os_release_id(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("ID="))
        .map(|value| value.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeHost {
        os: &'static str,
        os_release: Option<&'static str>,
        binaries: HashSet<&'static str>,
        root: bool,
    }

    impl FakeHost {
        fn new(os: &'static str, binaries: &[&'static str]) -> Self {
            Self {
                os,
                os_release: None,
                binaries: binaries.iter().copied().collect(),
                root: false,
            }
        }
    }

    impl HostProbe for FakeHost {
        fn os_name(&self) -> String {
            self.os.to_string()
        }

        fn os_release(&self) -> Option<String> {
            self.os_release.map(str::to_string)
        }

        fn has_executable(&self, name: &str) -> bool {
            self.binaries.contains(name)
        }

        fn is_privileged(&self) -> bool {
            self.root
        }
    }

    #[test]
    fn test_parse_os_release_id() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(parse_os_release_id(content).as_deref(), Some("ubuntu"));

        let quoted = "ID=\"fedora\"\n";
        assert_eq!(parse_os_release_id(quoted).as_deref(), Some("fedora"));
    }

    #[test]
    fn test_parse_os_release_ignores_id_like() {
        let content = "ID_LIKE=arch\n";
        assert_eq!(parse_os_release_id(content), None);
    }

    #[test]
    fn test_linux_with_os_release() {
        let mut host = FakeHost::new("linux", &["dnf", "yum", "sudo"]);
        host.os_release = Some("ID=fedora\n");
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::Auto);

        assert_eq!(profile.os_kind(), OsKind::Linux);
        assert_eq!(profile.distro_id(), "fedora");
        assert_eq!(profile.package_manager(), Some(PackageManager::Dnf));
        assert!(profile.elevation_available());
        assert!(!profile.is_simulated());
    }

    #[test]
    fn test_linux_without_os_release_degrades() {
        let host = FakeHost::new("linux", &[]);
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::Auto);

        assert_eq!(profile.distro_id(), UNKNOWN_LINUX);
        assert_eq!(profile.package_manager(), None);
        assert!(!profile.elevation_available());
    }

    #[test]
    fn test_probe_order_prefers_apt() {
        let host = FakeHost::new("linux", &["pacman", "apt", "zypper"]);
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::Auto);
        assert_eq!(profile.package_manager(), Some(PackageManager::Apt));
    }

    #[test]
    fn test_brew_only_probed_on_macos() {
        let linux = FakeHost::new("linux", &["brew"]);
        let profile = EnvironmentDetector::with_probe(linux).detect(SimulationMode::Auto);
        assert_eq!(profile.package_manager(), None);

        let mac = FakeHost::new("macos", &["brew"]);
        let profile = EnvironmentDetector::with_probe(mac).detect(SimulationMode::Auto);
        assert_eq!(profile.package_manager(), Some(PackageManager::Brew));
        assert_eq!(profile.distro_id(), "macos");
    }

    #[test]
    fn test_force_real_ignored_on_windows() {
        let host = FakeHost::new("windows", &[]);
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::ForceReal);
        assert_eq!(profile.distro_id(), "windows");
        assert!(profile.is_simulated());
    }

    #[test]
    fn test_simulate_on_linux() {
        let mut host = FakeHost::new("linux", &["apt"]);
        host.root = true;
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::Simulate);
        assert!(profile.is_simulated());
        assert!(profile.is_privileged());
    }

    #[test]
    fn test_other_os_uses_lowercase_name() {
        let host = FakeHost::new("FreeBSD", &[]);
        let profile = EnvironmentDetector::with_probe(host).detect(SimulationMode::Auto);
        assert_eq!(profile.os_kind(), OsKind::Other);
        assert_eq!(profile.distro_id(), "freebsd");
        assert!(profile.is_simulated());
    }
}
