//! Command execution
//!
//! Runs argv-style commands (never through a shell) with a timeout, optional
//! stdin payload and optional elevation, or simulates them when the profile
//! says so. Every outcome is folded into a [`CommandResult`]; nothing
//! escapes this boundary as an error or panic.

use super::privilege;
use super::profile::EnvironmentProfile;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Process exceeded its timeout and was killed
pub const EXIT_TIMEOUT: i32 = 124;
/// First argv token not found on the search path
pub const EXIT_NOT_FOUND: i32 = 127;
/// The process could not be started at all
pub const EXIT_SPAWN_FAILURE: i32 = -1;

pub const SIMULATION_MARKER: &str = "[SIMULATION]";

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to wait for the output pipes to drain after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);
/// Between SIGTERM and SIGKILL on timeout. sudo forwards SIGTERM to the
/// command it runs, never SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(1);

pub const OUTPUT_INCOMPLETE: &str = "(output incomplete: pipe still open)";

static PERMISSION_INDICATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)permission denied|operation not permitted|must be (run as )?root|are you root|you need to be root|a password is required|not in the sudoers|authentication failure|insufficient privileges",
    )
    .expect("permission indicator regex is valid")
});

/// A command to run, as an argument list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub timeout_secs: u64,
    pub needs_elevation: bool,
    pub stdin_payload: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            needs_elevation: false,
            stdin_payload: None,
        }
    }

    /// Set the timeout in seconds (at least one second)
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    pub fn elevated(mut self) -> Self {
        self.needs_elevation = true;
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin_payload = Some(payload.into());
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Human-readable reconstruction of argv, for logs and display only
    pub fn command_text(&self) -> String {
        self.argv.join(" ")
    }
}

/// Failure taxonomy derived from a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Success,
    CommandNotFound,
    Timeout,
    PermissionDenied,
    ProcessError,
    SpawnFailure,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Success => "ok",
            FailureKind::CommandNotFound => "command not found",
            FailureKind::Timeout => "timed out",
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::ProcessError => "failed",
            FailureKind::SpawnFailure => "could not start",
        }
    }

    /// Operator-facing hint for this kind of failure
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            FailureKind::Success => None,
            FailureKind::CommandNotFound => {
                Some("The required tool is not installed or not in PATH.")
            }
            FailureKind::Timeout => {
                Some("The command took too long. Raise the timeout in config.toml and retry.")
            }
            FailureKind::PermissionDenied => Some(
                "The command requires higher privileges. Run aegis as root or configure sudo.",
            ),
            FailureKind::ProcessError => None,
            FailureKind::SpawnFailure => {
                Some("The process could not be started. Check the log file for details.")
            }
        }
    }
}

/// Uniform outcome of an executed (or simulated) command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub command_text: String,
    pub duration_secs: f64,
    pub simulated: bool,
}

impl CommandResult {
    fn failure(exit_code: i32, message: String, command_text: String, started: Instant) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: message,
            command_text,
            duration_secs: started.elapsed().as_secs_f64(),
            simulated: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn kind(&self) -> FailureKind {
        match self.exit_code {
            0 => FailureKind::Success,
            EXIT_NOT_FOUND => FailureKind::CommandNotFound,
            EXIT_TIMEOUT => FailureKind::Timeout,
            code if code < 0 => FailureKind::SpawnFailure,
            _ if PERMISSION_INDICATOR.is_match(&self.stderr)
                || PERMISSION_INDICATOR.is_match(&self.stdout) =>
            {
                FailureKind::PermissionDenied
            }
            _ => FailureKind::ProcessError,
        }
    }

    /// Stdout followed by stderr, trimmed, for display
    pub fn combined_output(&self) -> String {
        let out = self.stdout.trim_end();
        let err = self.stderr.trim_end();
        match (out.is_empty(), err.is_empty()) {
            (true, true) => String::new(),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{}\n{}", out, err),
        }
    }

    /// Short explanation of a failed result
    pub fn error_summary(&self) -> String {
        let detail = self
            .stderr
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .or_else(|| self.stdout.lines().map(str::trim).find(|l| !l.is_empty()))
            .unwrap_or("no output");
        format!("{} (exit {}): {}", self.kind().label(), self.exit_code, detail)
    }
}

/// Anything that can execute a [`CommandSpec`] against a profile.
///
/// [`CommandExecutor`] is the real implementation; tests use recorders.
pub trait CommandRunner: Send + Sync {
    fn execute(&self, spec: &CommandSpec, profile: &EnvironmentProfile) -> CommandResult;

    fn command_exists(&self, program: &str, profile: &EnvironmentProfile) -> bool {
        validate_command(program, profile)
    }
}

/// Check if a command exists on the search path. Everything exists in
/// simulation.
pub fn validate_command(program: &str, profile: &EnvironmentProfile) -> bool {
    if profile.is_simulated() {
        return true;
    }
    let exists = which::which(program).is_ok();
    if !exists {
        debug!("Command not found on PATH: {}", program);
    }
    exists
}

/// Executes commands for real, or simulates them on simulated profiles
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    simulated_delay: Duration,
}

impl CommandExecutor {
    pub fn new(simulated_delay: Duration) -> Self {
        Self { simulated_delay }
    }

    fn simulate(&self, spec: &CommandSpec, started: Instant) -> CommandResult {
        let command_text = spec.command_text();
        info!(command = %command_text, "[SIM] Would execute");
        if !self.simulated_delay.is_zero() {
            thread::sleep(self.simulated_delay);
        }
        let tag = if spec.needs_elevation { " (elevated)" } else { "" };
        CommandResult {
            exit_code: 0,
            stdout: format!("{}{} Executed: {}", SIMULATION_MARKER, tag, command_text),
            stderr: String::new(),
            command_text,
            duration_secs: started.elapsed().as_secs_f64(),
            simulated: true,
        }
    }
}

impl CommandRunner for CommandExecutor {
    fn execute(&self, spec: &CommandSpec, profile: &EnvironmentProfile) -> CommandResult {
        let started = Instant::now();

        let Some(program) = spec.program() else {
            warn!("Refusing to execute an empty command");
            return CommandResult::failure(
                EXIT_SPAWN_FAILURE,
                "empty command".to_string(),
                String::new(),
                started,
            );
        };

        if profile.is_simulated() {
            return self.simulate(spec, started);
        }

        let argv = if spec.needs_elevation {
            privilege::apply(&spec.argv, profile)
        } else {
            spec.argv.clone()
        };
        let command_text = argv.join(" ");

        if which::which(program).is_err() {
            warn!(command = %command_text, "Command not found: {}", program);
            return CommandResult::failure(
                EXIT_NOT_FOUND,
                format!("command not found: {}", program),
                command_text,
                started,
            );
        }

        debug!(
            command = %command_text,
            timeout = spec.timeout_secs,
            stdin = spec.stdin_payload.is_some(),
            "Executing"
        );
        let result = run_process(&argv, command_text, spec, started);

        if result.success() {
            info!(
                command = %result.command_text,
                duration_secs = result.duration_secs,
                "Command finished"
            );
        } else {
            warn!(
                command = %result.command_text,
                exit_code = result.exit_code,
                duration_secs = result.duration_secs,
                "Command failed: {}",
                result.stderr.trim()
            );
        }
        result
    }
}

fn run_process(
    argv: &[String],
    command_text: String,
    spec: &CommandSpec,
    started: Instant,
) -> CommandResult {
    let stdin = if spec.stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group, so a timeout reaches everything the command started
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return CommandResult::failure(
                EXIT_NOT_FOUND,
                format!("command not found: {}", argv[0]),
                command_text,
                started,
            );
        }
        Err(e) => {
            return CommandResult::failure(
                EXIT_SPAWN_FAILURE,
                format!("failed to start {}: {}", argv[0], e),
                command_text,
                started,
            );
        }
    };

    // Readers start before stdin is written so a child that talks first
    // cannot fill its pipe and stall the write.
    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    if let Some(payload) = &spec.stdin_payload {
        if let Err(e) = feed_stdin(&mut child, payload) {
            reap(&mut child);
            return CommandResult::failure(
                EXIT_SPAWN_FAILURE,
                format!("failed to write stdin of {}: {}", argv[0], e),
                command_text,
                started,
            );
        }
    }

    let timeout = Duration::from_secs(spec.timeout_secs);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    reap(&mut child);
                    break None;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                reap(&mut child);
                return CommandResult::failure(
                    EXIT_SPAWN_FAILURE,
                    format!("failed to wait for {}: {}", argv[0], e),
                    command_text,
                    started,
                );
            }
        }
    };

    let drain_deadline = Instant::now() + DRAIN_GRACE;
    let stdout = collect(stdout_rx, drain_deadline);
    let stderr = collect(stderr_rx, drain_deadline);
    let complete = stdout.is_some() && stderr.is_some();
    let stdout = stdout.unwrap_or_default();
    let mut stderr = stderr.unwrap_or_default();

    if !complete {
        warn!(command = %command_text, "Output pipe still open after exit; output truncated");
        push_line(&mut stderr, OUTPUT_INCOMPLETE);
    }

    let exit_code = match status {
        Some(status) => exit_code_of(status),
        None => {
            push_line(&mut stderr, &format!("timed out after {}s", spec.timeout_secs));
            EXIT_TIMEOUT
        }
    };

    CommandResult {
        exit_code,
        stdout,
        stderr,
        command_text,
        duration_secs: started.elapsed().as_secs_f64(),
        simulated: false,
    }
}

/// Write the payload and close stdin
fn feed_stdin(child: &mut Child, payload: &str) -> io::Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };
    match stdin.write_all(payload.as_bytes()) {
        // The child may exit without reading its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

fn push_line(buf: &mut String, line: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(line);
}

/// Stop the child and everything in its process group
#[cfg(unix)]
fn reap(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;

    // SAFETY: killpg only sends a signal; pgid is the group spawn created
    unsafe {
        libc::killpg(pgid, libc::SIGTERM);
    }

    let deadline = Instant::now() + TERM_GRACE;
    let mut leader_gone = false;
    while Instant::now() < deadline {
        if !leader_gone {
            leader_gone = !matches!(child.try_wait(), Ok(None));
        }
        if leader_gone && !group_alive(pgid) {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }

    // SAFETY: as above
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Signal 0 probes the group. EPERM means members exist that we may not
/// signal, e.g. a root command under sudo.
#[cfg(unix)]
fn group_alive(pgid: libc::pid_t) -> bool {
    // SAFETY: signal 0 delivers nothing
    let rc = unsafe { libc::killpg(pgid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

trait Pipe: Read + Send + 'static {}
impl Pipe for ChildStdout {}
impl Pipe for ChildStderr {}

fn drain<P: Pipe>(pipe: Option<P>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    match pipe {
        Some(mut pipe) => {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
            });
        }
        None => {
            let _ = tx.send(String::new());
        }
    }
    rx
}

/// Grandchildren can keep a pipe open after the child is gone; give up
/// waiting for them at `deadline`. `None` means the pipe never closed.
fn collect(rx: mpsc::Receiver<String>, deadline: Instant) -> Option<String> {
    rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
        .ok()
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(EXIT_SPAWN_FAILURE)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(EXIT_SPAWN_FAILURE)
}
