//! Host interaction layer
//!
//! Environment detection, command execution, privilege escalation, package
//! installs, service control and fail-closed backups.

pub mod backup;
pub mod detect;
pub mod executor;
pub mod packages;
pub mod privilege;
pub mod profile;
pub mod services;

pub use backup::{BackupError, BackupRecord, FileBackupGuard};
pub use detect::EnvironmentDetector;
pub use executor::{CommandExecutor, CommandResult, CommandRunner, CommandSpec, FailureKind};
pub use profile::{EnvironmentProfile, ServiceManager, SimulationMode};
pub use services::{ServiceController, ServiceVerb};
