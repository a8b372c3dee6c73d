//! Security operations
//!
//! Each operation is a plain function over an [`OperationContext`] that
//! issues commands one at a time through the executor and returns a short
//! summary. [`execute`] wraps it into an [`OperationReport`]; nothing an
//! operation does (errors, cancellation, panics) escapes as anything else.

pub mod hardening;
pub mod maintenance;
pub mod scans;

use crate::config::{Config, Timeouts};
use crate::system::packages::{InstallOutcome, PackageInstaller};
use crate::system::{
    CommandResult, CommandRunner, CommandSpec, EnvironmentProfile, FailureKind, FileBackupGuard,
    ServiceController, ServiceManager, ServiceVerb,
};
use crate::tasks::CancelToken;
use crate::types::format_duration;
use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

// ── Catalogue ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Lynis,
    Clamav,
    Rkhunter,
    Nmap,
    HardenSsh,
    Firewall,
    SecureWeb,
    Update,
    Logs,
    Resources,
    BackupHome,
    Report,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::Lynis,
        Operation::Clamav,
        Operation::Rkhunter,
        Operation::Nmap,
        Operation::HardenSsh,
        Operation::Firewall,
        Operation::SecureWeb,
        Operation::Update,
        Operation::Logs,
        Operation::Resources,
        Operation::BackupHome,
        Operation::Report,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Operation::Lynis => "lynis",
            Operation::Clamav => "clamav",
            Operation::Rkhunter => "rkhunter",
            Operation::Nmap => "nmap",
            Operation::HardenSsh => "harden-ssh",
            Operation::Firewall => "firewall",
            Operation::SecureWeb => "secure-web",
            Operation::Update => "update",
            Operation::Logs => "logs",
            Operation::Resources => "resources",
            Operation::BackupHome => "backup-home",
            Operation::Report => "report",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Operation::Lynis => "Security audit (Lynis)",
            Operation::Clamav => "Malware scan (ClamAV)",
            Operation::Rkhunter => "Rootkit scan (RKHunter)",
            Operation::Nmap => "Port scan (Nmap)",
            Operation::HardenSsh => "Harden SSH",
            Operation::Firewall => "Configure firewall (UFW)",
            Operation::SecureWeb => "Lock down web root",
            Operation::Update => "Update system packages",
            Operation::Logs => "Analyze logs",
            Operation::Resources => "Check resources",
            Operation::BackupHome => "Back up /home",
            Operation::Report => "Generate security report",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Operation::Lynis | Operation::Clamav | Operation::Rkhunter | Operation::Nmap => {
                Category::Scans
            }
            Operation::HardenSsh | Operation::Firewall | Operation::SecureWeb => Category::Hardening,
            Operation::Update
            | Operation::Logs
            | Operation::Resources
            | Operation::BackupHome
            | Operation::Report => Category::Maintenance,
        }
    }

    /// Changes system configuration; the dashboard asks before running it
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Operation::HardenSsh | Operation::Firewall | Operation::SecureWeb | Operation::Update
        )
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Scans,
    Hardening,
    Maintenance,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Scans, Category::Hardening, Category::Maintenance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Scans => "Scans",
            Category::Hardening => "Hardening",
            Category::Maintenance => "Maintenance",
        }
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        Operation::ALL.into_iter().filter(move |op| op.category() == *self)
    }
}

// ── Reports ──

/// Raised through `anyhow` when the cancel token is set
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub title: String,
    pub kind: FailureKind,
    pub result: CommandResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: Operation,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub status: OperationStatus,
    pub simulated: bool,
    pub steps: Vec<StepRecord>,
    pub notes: Vec<String>,
    pub summary: String,
}

impl OperationReport {
    pub fn succeeded(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    /// Plain-text rendering for the headless CLI and the output pane
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} [{}] {}{}",
            self.operation.label(),
            self.status.as_str(),
            format_duration(self.duration_secs()),
            if self.simulated { " (simulated)" } else { "" }
        );
        let _ = writeln!(out, "{}", self.summary);

        for note in &self.notes {
            let _ = writeln!(out, "  ! {}", note);
        }

        for step in &self.steps {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "── {} · $ {} → exit {} ({})",
                step.title,
                step.result.command_text,
                step.result.exit_code,
                step.kind.label()
            );
            let output = step.result.combined_output();
            if !output.is_empty() {
                let _ = writeln!(out, "{}", output);
            }
            if let Some(hint) = step.kind.remediation() {
                let _ = writeln!(out, "  hint: {}", hint);
            }
        }
        out
    }
}

// ── Execution context ──

/// Everything an operation may touch, plus what it has done so far
pub struct OperationContext {
    runner: Arc<dyn CommandRunner>,
    profile: Arc<EnvironmentProfile>,
    config: Arc<Config>,
    backups: Arc<FileBackupGuard>,
    cancel: CancelToken,
    steps: Vec<StepRecord>,
    notes: Vec<String>,
}

impl OperationContext {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        profile: Arc<EnvironmentProfile>,
        config: Arc<Config>,
        backups: Arc<FileBackupGuard>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            runner,
            profile,
            config,
            backups,
            cancel,
            steps: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.config.timeouts
    }

    pub fn backups(&self) -> Arc<FileBackupGuard> {
        Arc::clone(&self.backups)
    }

    /// Fail with [`Cancelled`] if the operator asked to stop
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        Ok(())
    }

    /// Run one command and record it as a step
    pub fn run(&mut self, title: &str, spec: CommandSpec) -> Result<CommandResult> {
        self.checkpoint()?;
        let result = self.runner.execute(&spec, &self.profile);
        self.record(title, result.clone());
        Ok(result)
    }

    /// Like [`run`](Self::run), but a nonzero exit is an error
    pub fn run_checked(&mut self, title: &str, spec: CommandSpec) -> Result<CommandResult> {
        let result = self.run(title, spec)?;
        if !result.success() {
            bail!("{}: {}", title, result.error_summary());
        }
        Ok(result)
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        info!("{}", note);
        self.notes.push(note);
    }

    pub fn has_tool(&self, program: &str) -> bool {
        self.runner.command_exists(program, &self.profile)
    }

    /// Make sure `program` is available, installing `package` if needed.
    /// A failed install is noted and reported as `false`, not as an error.
    pub fn ensure_tool(&mut self, program: &str, package: &str) -> Result<bool> {
        if self.has_tool(program) {
            return Ok(true);
        }
        self.checkpoint()?;

        let outcome = PackageInstaller::new(self.runner.as_ref(), self.config.timeouts.install)
            .try_install(package, &self.profile);
        let title = format!("Install {}", package);
        match &outcome {
            InstallOutcome::Installed(result) | InstallOutcome::Failed(result) => {
                self.record(&title, result.clone())
            }
            InstallOutcome::NoPackageManager => {}
        }
        if !outcome.succeeded() {
            self.note(outcome.describe(package));
        }
        Ok(outcome.succeeded())
    }

    pub fn find_service(&mut self, candidates: &[&str]) -> Result<Option<(String, ServiceManager)>> {
        self.checkpoint()?;
        let found = ServiceController::new(self.runner.as_ref(), &self.profile, self.config.timeouts.default)
            .find_unit(candidates);
        Ok(found)
    }

    /// Issue a service verb through the controller and record it
    pub fn control_service(&mut self, verb: ServiceVerb, unit: &str) -> Result<CommandResult> {
        self.checkpoint()?;
        let result = ServiceController::new(self.runner.as_ref(), &self.profile, self.config.timeouts.default)
            .control(verb, unit);
        self.record(&format!("{} {}", capitalize(verb.as_str()), unit), result.clone());
        Ok(result)
    }

    fn record(&mut self, title: &str, result: CommandResult) {
        self.steps.push(StepRecord {
            title: title.to_string(),
            kind: result.kind(),
            result,
        });
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Shorthand for a [`CommandSpec`] from string literals
pub(crate) fn cmd(argv: &[&str]) -> CommandSpec {
    CommandSpec::new(argv.iter().copied())
}

// ── Dispatch ──

fn dispatch(operation: Operation, ctx: &mut OperationContext) -> Result<String> {
    match operation {
        Operation::Lynis => scans::lynis(ctx),
        Operation::Clamav => scans::clamav(ctx),
        Operation::Rkhunter => scans::rkhunter(ctx),
        Operation::Nmap => scans::nmap(ctx),
        Operation::HardenSsh => hardening::harden_ssh(ctx),
        Operation::Firewall => hardening::firewall(ctx),
        Operation::SecureWeb => hardening::secure_web(ctx),
        Operation::Update => maintenance::update_system(ctx),
        Operation::Logs => maintenance::analyze_logs(ctx),
        Operation::Resources => maintenance::check_resources(ctx),
        Operation::BackupHome => maintenance::backup_home(ctx),
        Operation::Report => maintenance::generate_report(ctx),
    }
}

/// Run an operation to completion and describe what happened
pub fn execute(operation: Operation, mut ctx: OperationContext) -> OperationReport {
    let started_at = Local::now();
    info!(operation = operation.id(), simulated = ctx.profile.is_simulated(), "Operation started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatch(operation, &mut ctx)));

    let (status, summary) = match outcome {
        Ok(Ok(summary)) => (OperationStatus::Succeeded, summary),
        Ok(Err(e)) if e.downcast_ref::<Cancelled>().is_some() => {
            if ctx.cancel.terminate_requested() {
                ctx.note("Termination was requested; the running command was allowed to finish");
            }
            (
                OperationStatus::Cancelled,
                format!("Cancelled after {} step(s)", ctx.steps.len()),
            )
        }
        Ok(Err(e)) => (OperationStatus::Failed, format!("{:#}", e)),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(operation = operation.id(), "Operation panicked: {}", message);
            (OperationStatus::Failed, format!("internal error: {}", message))
        }
    };

    match status {
        OperationStatus::Succeeded => info!(operation = operation.id(), "Operation succeeded"),
        OperationStatus::Failed => warn!(operation = operation.id(), "Operation failed: {}", summary),
        OperationStatus::Cancelled => info!(operation = operation.id(), "Operation cancelled"),
    }

    OperationReport {
        operation,
        started_at,
        finished_at: Local::now(),
        status,
        simulated: ctx.profile.is_simulated(),
        steps: ctx.steps,
        notes: ctx.notes,
        summary,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fakes for operation tests

    use super::*;
    use crate::system::profile::{OsKind, PackageManager, SimulationMode};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// Records every command and answers by command text. `missing` only
    /// affects presence checks.
    #[derive(Default)]
    pub struct Recorder {
        pub specs: Mutex<Vec<CommandSpec>>,
        pub answers: HashMap<String, (i32, String)>,
        pub program_answers: HashMap<String, (i32, String)>,
        pub missing: HashSet<String>,
    }

    impl Recorder {
        pub fn answer(mut self, command: &str, exit_code: i32, output: &str) -> Self {
            self.answers
                .insert(command.to_string(), (exit_code, output.to_string()));
            self
        }

        /// Answer every invocation of `program` not matched by [`answer`](Self::answer)
        pub fn answer_program(mut self, program: &str, exit_code: i32, output: &str) -> Self {
            self.program_answers
                .insert(program.to_string(), (exit_code, output.to_string()));
            self
        }

        pub fn without(mut self, program: &str) -> Self {
            self.missing.insert(program.to_string());
            self
        }

        pub fn commands(&self) -> Vec<String> {
            self.specs
                .lock()
                .unwrap()
                .iter()
                .map(CommandSpec::command_text)
                .collect()
        }
    }

    impl CommandRunner for Recorder {
        fn execute(&self, spec: &CommandSpec, _profile: &EnvironmentProfile) -> CommandResult {
            self.specs.lock().unwrap().push(spec.clone());
            let text = spec.command_text();
            let (exit_code, output) = self
                .answers
                .get(&text)
                .or_else(|| self.program_answers.get(spec.program().unwrap_or_default()))
                .cloned()
                .unwrap_or((0, String::new()));
            let (stdout, stderr) = if exit_code == 0 {
                (output, String::new())
            } else {
                (String::new(), output)
            };
            CommandResult {
                exit_code,
                stdout,
                stderr,
                command_text: text,
                duration_secs: 0.0,
                simulated: false,
            }
        }

        fn command_exists(&self, program: &str, _profile: &EnvironmentProfile) -> bool {
            !self.missing.contains(program)
        }
    }

    pub fn linux_profile() -> Arc<EnvironmentProfile> {
        Arc::new(EnvironmentProfile::new(
            OsKind::Linux,
            "debian",
            Some(PackageManager::Apt),
            true,
            true,
            SimulationMode::Auto,
        ))
    }

    pub fn context(runner: Arc<Recorder>, config: Config) -> OperationContext {
        context_with(runner, linux_profile(), config)
    }

    pub fn context_with(
        runner: Arc<Recorder>,
        profile: Arc<EnvironmentProfile>,
        config: Config,
    ) -> OperationContext {
        let runner: Arc<dyn CommandRunner> = runner;
        let backups = Arc::new(FileBackupGuard::for_profile(
            Arc::clone(&runner),
            Arc::clone(&profile),
            30,
        ));
        OperationContext::new(runner, profile, Arc::new(config), backups, CancelToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_operation_ids_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_id(op.id()), Some(op));
        }
        assert_eq!(Operation::from_id("rm-rf"), None);
    }

    #[test]
    fn test_serialized_id_matches_cli_id() {
        for op in Operation::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.id()));
        }
    }

    #[test]
    fn test_every_operation_has_a_category() {
        let grouped: usize = Category::ALL.iter().map(|c| c.operations().count()).sum();
        assert_eq!(grouped, Operation::ALL.len());
    }

    #[test]
    fn test_destructive_operations() {
        let destructive: Vec<&str> = Operation::ALL
            .iter()
            .filter(|op| op.is_destructive())
            .map(|op| op.id())
            .collect();
        assert_eq!(destructive, vec!["harden-ssh", "firewall", "secure-web", "update"]);
    }

    #[test]
    fn test_run_checked_fails_on_nonzero_exit() {
        let runner = Arc::new(Recorder::default().answer("false", 1, "nope"));
        let mut ctx = context(runner, Config::default());

        let err = ctx.run_checked("Check", cmd(&["false"])).unwrap_err();
        assert!(err.to_string().contains("Check"));
        assert_eq!(ctx.steps.len(), 1);
    }

    #[test]
    fn test_checkpoint_blocks_commands_after_cancel() {
        let runner = Arc::new(Recorder::default());
        let token = CancelToken::new();
        let dyn_runner: Arc<dyn CommandRunner> = runner.clone();
        let profile = linux_profile();
        let backups = Arc::new(FileBackupGuard::for_profile(dyn_runner.clone(), profile.clone(), 30));
        let mut ctx = OperationContext::new(
            dyn_runner,
            profile,
            Arc::new(Config::default()),
            backups,
            token.clone(),
        );

        token.cancel();
        let err = ctx.run("Uptime", cmd(&["uptime"])).unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_ensure_tool_installs_missing_program() {
        let runner = Arc::new(Recorder::default().without("lynis"));
        let mut ctx = context(runner.clone(), Config::default());

        assert!(ctx.ensure_tool("lynis", "lynis").unwrap());
        assert_eq!(runner.commands(), vec!["apt-get install -y lynis"]);
        assert!(runner.specs.lock().unwrap()[0].needs_elevation);
    }

    #[test]
    fn test_ensure_tool_failure_is_a_note() {
        let runner = Arc::new(
            Recorder::default()
                .without("ufw")
                .answer("apt-get install -y ufw", 100, "E: Unable to locate package ufw"),
        );
        let mut ctx = context(runner, Config::default());

        assert!(!ctx.ensure_tool("ufw", "ufw").unwrap());
        assert_eq!(ctx.notes.len(), 1);
        assert!(ctx.notes[0].contains("Could not install ufw"));
    }

    #[test]
    fn test_execute_reports_failure_summary() {
        let runner = Arc::new(Recorder::default().answer("lynis audit system --quick --no-colors", 1, "boom"));
        let report = execute(Operation::Lynis, context(runner, Config::default()));

        assert_eq!(report.status, OperationStatus::Failed);
        assert!(report.summary.contains("boom"));
        assert!(!report.render_text().is_empty());
    }

    #[test]
    fn test_render_text_lists_steps_and_hints() {
        let runner = Arc::new(Recorder::default());
        let report = execute(Operation::Resources, context(runner, Config::default()));
        let text = report.render_text();

        assert!(text.starts_with("Check resources [succeeded]"));
        assert!(text.contains("$ uptime"));
    }
}
