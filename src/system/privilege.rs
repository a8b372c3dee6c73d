//! Privilege escalation
//!
//! Decides whether a command gets an elevation prefix. Never fabricates
//! privilege: without root and without an elevation tool the command runs
//! as-is and fails with the target's own permission error.

use super::profile::EnvironmentProfile;
use std::path::Path;

pub const ELEVATION_TOOL: &str = "sudo";

/// Read the password from stdin instead of a terminal (the dashboard owns it)
const READ_SECRET_FROM_STDIN: &str = "-S";

/// Prefix to prepend for an elevated command (possibly empty)
pub fn escalation_prefix(profile: &EnvironmentProfile) -> Vec<String> {
    if profile.is_privileged() || !profile.elevation_available() {
        return Vec::new();
    }
    vec![ELEVATION_TOOL.to_string(), READ_SECRET_FROM_STDIN.to_string()]
}

/// True if `program` already is the elevation tool (bare name or full path)
pub fn is_elevation_invocation(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .map_or(false, |name| name == ELEVATION_TOOL)
}

/// Apply the escalation prefix to `argv` unless it is already elevated
pub fn apply(argv: &[String], profile: &EnvironmentProfile) -> Vec<String> {
    let already_elevated = argv
        .first()
        .map_or(false, |program| is_elevation_invocation(program));
    if already_elevated {
        return argv.to_vec();
    }

    let mut elevated = escalation_prefix(profile);
    elevated.extend(argv.iter().cloned());
    elevated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::profile::{OsKind, SimulationMode};

    fn profile(privileged: bool, sudo: bool) -> EnvironmentProfile {
        EnvironmentProfile::new(
            OsKind::Linux,
            "debian",
            None,
            privileged,
            sudo,
            SimulationMode::Auto,
        )
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefix_for_unprivileged_with_sudo() {
        assert_eq!(escalation_prefix(&profile(false, true)), argv(&["sudo", "-S"]));
    }

    #[test]
    fn test_no_prefix_when_root() {
        assert!(escalation_prefix(&profile(true, true)).is_empty());
    }

    #[test]
    fn test_no_prefix_without_tool() {
        assert!(escalation_prefix(&profile(false, false)).is_empty());
    }

    #[test]
    fn test_apply_prepends_prefix() {
        let elevated = apply(&argv(&["ufw", "enable"]), &profile(false, true));
        assert_eq!(elevated, argv(&["sudo", "-S", "ufw", "enable"]));
    }

    #[test]
    fn test_apply_never_doubles_elevation() {
        let p = profile(false, true);
        let already = argv(&["sudo", "systemctl", "restart", "ssh"]);
        assert_eq!(apply(&already, &p).len(), already.len());

        let full_path = argv(&["/usr/bin/sudo", "ls"]);
        assert_eq!(apply(&full_path, &p), full_path);
    }

    #[test]
    fn test_is_elevation_invocation() {
        assert!(is_elevation_invocation("sudo"));
        assert!(is_elevation_invocation("/usr/bin/sudo"));
        assert!(!is_elevation_invocation("sudoedit"));
        assert!(!is_elevation_invocation("ls"));
    }
}
