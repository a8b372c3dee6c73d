//! Service management
//!
//! `systemctl` is preferred; `service` is the fallback when systemctl is
//! missing or reports that the unit does not exist. The manager is resolved
//! per unit on demand, never cached, because a host can run systemd and
//! still ship some units only as SysV scripts.

use super::executor::{CommandResult, CommandRunner, CommandSpec, FailureKind, EXIT_NOT_FOUND};
use super::profile::{EnvironmentProfile, ServiceManager};
use tracing::{debug, info};

/// `systemctl status` exit code for an unknown unit (LSB "program or service
/// status is unknown")
const STATUS_UNIT_UNKNOWN: i32 = 4;
/// `systemctl start/restart/...` exit code when the unit is not loaded
const CONTROL_UNIT_NOT_LOADED: i32 = 5;

/// Verbs understood by both systemctl and the service wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVerb {
    Restart,
    Status,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Restart => "restart",
            ServiceVerb::Status => "status",
        }
    }

    /// Status is read-only and does not need root
    pub fn needs_elevation(&self) -> bool {
        !matches!(self, ServiceVerb::Status)
    }
}

/// Issues service verbs through a [`CommandRunner`]
pub struct ServiceController<'a> {
    runner: &'a dyn CommandRunner,
    profile: &'a EnvironmentProfile,
    timeout_secs: u64,
}

impl<'a> ServiceController<'a> {
    pub fn new(runner: &'a dyn CommandRunner, profile: &'a EnvironmentProfile, timeout_secs: u64) -> Self {
        Self {
            runner,
            profile,
            timeout_secs,
        }
    }

    /// Which manager can handle `unit`
    pub fn resolve(&self, unit: &str) -> ServiceManager {
        if self.profile.is_simulated() {
            return ServiceManager::Systemd;
        }

        if self.runner.command_exists("systemctl", self.profile) {
            let result = self.run(systemctl_argv(ServiceVerb::Status, unit), ServiceVerb::Status);
            if result.exit_code != STATUS_UNIT_UNKNOWN && !unit_not_found(&result) {
                return ServiceManager::Systemd;
            }
        }

        if self.runner.command_exists("service", self.profile) {
            let result = self.run(service_argv(ServiceVerb::Status, unit), ServiceVerb::Status);
            if result.exit_code != STATUS_UNIT_UNKNOWN && !unit_not_found(&result) {
                return ServiceManager::SysvService;
            }
        }

        debug!("No service manager knows {}", unit);
        ServiceManager::None
    }

    /// First candidate unit that some manager knows, with that manager
    pub fn find_unit(&self, candidates: &[&str]) -> Option<(String, ServiceManager)> {
        candidates.iter().find_map(|unit| match self.resolve(unit) {
            ServiceManager::None => None,
            manager => Some((unit.to_string(), manager)),
        })
    }

    /// Run `verb` on `unit`, falling back from systemctl to service
    pub fn control(&self, verb: ServiceVerb, unit: &str) -> CommandResult {
        let primary = self.run(systemctl_argv(verb, unit), verb);
        if primary.success() || !(primary.kind() == FailureKind::CommandNotFound || unit_not_found(&primary)) {
            return primary;
        }

        info!(
            "systemctl cannot {} {} ({}), trying service",
            verb.as_str(),
            unit,
            primary.kind().label()
        );
        let fallback = self.run(service_argv(verb, unit), verb);
        if fallback.exit_code == EXIT_NOT_FOUND && primary.exit_code != EXIT_NOT_FOUND {
            // The service wrapper is absent; the systemctl answer is more useful
            return primary;
        }
        fallback
    }

    fn run(&self, argv: Vec<String>, verb: ServiceVerb) -> CommandResult {
        let mut spec = CommandSpec::new(argv).timeout(self.timeout_secs);
        if verb.needs_elevation() {
            spec = spec.elevated();
        }
        self.runner.execute(&spec, self.profile)
    }
}

pub fn systemctl_argv(verb: ServiceVerb, unit: &str) -> Vec<String> {
    vec!["systemctl".into(), verb.as_str().into(), unit.into()]
}

/// `service` takes the bare script name, without a `.service` suffix
pub fn service_argv(verb: ServiceVerb, unit: &str) -> Vec<String> {
    let name = unit.strip_suffix(".service").unwrap_or(unit);
    vec!["service".into(), name.into(), verb.as_str().into()]
}

/// Whether a result says the unit does not exist
pub fn unit_not_found(result: &CommandResult) -> bool {
    if result.success() || result.exit_code == EXIT_NOT_FOUND {
        return false;
    }
    let stderr = result.stderr.to_lowercase();
    let mentions_missing = stderr.contains("not found")
        || stderr.contains("could not be found")
        || stderr.contains("unrecognized service")
        || stderr.contains("no such");
    result.exit_code == STATUS_UNIT_UNKNOWN || result.exit_code == CONTROL_UNIT_NOT_LOADED || mentions_missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::profile::{OsKind, SimulationMode};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers by command text; unknown commands succeed
    struct Scripted {
        answers: HashMap<String, (i32, &'static str)>,
        missing: Vec<&'static str>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: &[(&str, i32, &'static str)], missing: &[&'static str]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(cmd, code, err)| (cmd.to_string(), (*code, *err)))
                    .collect(),
                missing: missing.to_vec(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for Scripted {
        fn execute(&self, spec: &CommandSpec, _profile: &EnvironmentProfile) -> CommandResult {
            let text = spec.command_text();
            self.seen.lock().unwrap().push(text.clone());
            let (exit_code, stderr) = if self.missing.iter().any(|m| spec.program() == Some(*m)) {
                (EXIT_NOT_FOUND, "command not found")
            } else {
                self.answers.get(&text).copied().unwrap_or((0, ""))
            };
            CommandResult {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
                command_text: text,
                duration_secs: 0.0,
                simulated: false,
            }
        }

        fn command_exists(&self, program: &str, _profile: &EnvironmentProfile) -> bool {
            !self.missing.contains(&program)
        }
    }

    fn live() -> EnvironmentProfile {
        EnvironmentProfile::new(OsKind::Linux, "debian", None, true, false, SimulationMode::Auto)
    }

    #[test]
    fn test_resolve_prefers_systemd() {
        let runner = Scripted::new(&[("systemctl status ssh", 3, "")], &[]);
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        assert_eq!(ctl.resolve("ssh"), ServiceManager::Systemd);
    }

    #[test]
    fn test_resolve_falls_back_to_service() {
        let runner = Scripted::new(
            &[("systemctl status sshd", 4, "Unit sshd.service could not be found.")],
            &[],
        );
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        assert_eq!(ctl.resolve("sshd"), ServiceManager::SysvService);
    }

    #[test]
    fn test_resolve_none() {
        let runner = Scripted::new(
            &[
                ("systemctl status openssh", 4, ""),
                ("service openssh status", 1, "openssh: unrecognized service"),
            ],
            &[],
        );
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        assert_eq!(ctl.resolve("openssh"), ServiceManager::None);
    }

    #[test]
    fn test_resolve_without_systemctl() {
        let runner = Scripted::new(&[], &["systemctl"]);
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        assert_eq!(ctl.resolve("ssh"), ServiceManager::SysvService);
    }

    #[test]
    fn test_find_unit_picks_first_known() {
        let runner = Scripted::new(
            &[
                ("systemctl status ssh", 4, ""),
                ("service ssh status", 1, "ssh: unrecognized service"),
            ],
            &[],
        );
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        let found = ctl.find_unit(&["ssh", "sshd", "openssh"]);
        assert_eq!(found, Some(("sshd".to_string(), ServiceManager::Systemd)));
    }

    #[test]
    fn test_control_falls_back_when_unit_missing() {
        let runner = Scripted::new(
            &[("systemctl restart sshd", 5, "Failed to restart sshd.service: Unit sshd.service not found.")],
            &[],
        );
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        let result = ctl.control(ServiceVerb::Restart, "sshd");

        assert!(result.success());
        assert_eq!(result.command_text, "service sshd restart");
    }

    #[test]
    fn test_control_does_not_fall_back_on_real_failure() {
        let runner = Scripted::new(
            &[("systemctl restart ssh", 1, "Job for ssh.service failed because the control process exited")],
            &[],
        );
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        let result = ctl.control(ServiceVerb::Restart, "ssh");

        assert_eq!(result.exit_code, 1);
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_control_without_any_manager_keeps_127() {
        let runner = Scripted::new(&[], &["systemctl", "service"]);
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        let result = ctl.control(ServiceVerb::Restart, "ssh");
        assert_eq!(result.exit_code, EXIT_NOT_FOUND);
    }

    #[test]
    fn test_control_is_elevated_except_status() {
        struct Capture(Mutex<Vec<bool>>);
        impl CommandRunner for Capture {
            fn execute(&self, spec: &CommandSpec, _p: &EnvironmentProfile) -> CommandResult {
                self.0.lock().unwrap().push(spec.needs_elevation);
                CommandResult {
                    exit_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                    command_text: spec.command_text(),
                    duration_secs: 0.0,
                    simulated: false,
                }
            }
        }
        let runner = Capture(Mutex::new(Vec::new()));
        let profile = live();
        let ctl = ServiceController::new(&runner, &profile, 10);
        ctl.control(ServiceVerb::Restart, "ssh");
        ctl.control(ServiceVerb::Status, "ssh");
        assert_eq!(*runner.0.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_service_argv_strips_suffix() {
        assert_eq!(
            service_argv(ServiceVerb::Restart, "ssh.service"),
            vec!["service", "ssh", "restart"]
        );
    }
}
