//! Fail-closed file backups
//!
//! A backup is taken and verified before any mutating command touches the
//! original file. If the backup cannot be made the mutation never runs.
//! There is no automatic rollback; the record tells the operator where the
//! copy lives.

use super::executor::{CommandRunner, CommandSpec};
use super::profile::EnvironmentProfile;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Highest `.N` suffix tried when the timestamped name is taken
pub const MAX_COLLISION_SUFFIX: u32 = 999;

/// A backup that exists (or, in simulation, would exist)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupRecord {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub created_at: DateTime<Local>,
    pub simulated: bool,
}

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("cannot back up {0}: file does not exist")]
    SourceMissing(PathBuf),

    #[error("no free backup name left for {0}")]
    NameExhausted(PathBuf),

    #[error("copying {path} failed: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("elevated copy of {path} failed: {detail}")]
    ElevatedCopy { path: PathBuf, detail: String },

    #[error("backup {0} could not be verified")]
    Verify(PathBuf),
}

/// Candidate backup names, in the order they are tried:
/// `<path>.bak.<ts>`, then `<path>.bak.<ts>.1` up to `.999`
pub fn backup_candidates(original: &Path, timestamp: i64) -> impl Iterator<Item = PathBuf> {
    let mut base = OsString::from(original.as_os_str());
    base.push(format!(".bak.{}", timestamp));
    let first = PathBuf::from(base.clone());

    std::iter::once(first).chain((1..=MAX_COLLISION_SUFFIX).map(move |n| {
        let mut name = base.clone();
        name.push(format!(".{}", n));
        PathBuf::from(name)
    }))
}

/// Strategy for producing a backup copy
pub trait BackupStore: Send + Sync {
    fn create(&self, original: &Path) -> Result<BackupRecord, BackupError>;
}

/// Computes the record without touching the filesystem
#[derive(Debug, Default)]
pub struct SimulatedStore;

impl BackupStore for SimulatedStore {
    fn create(&self, original: &Path) -> Result<BackupRecord, BackupError> {
        let created_at = Local::now();
        let backup_path = backup_candidates(original, created_at.timestamp())
            .next()
            .ok_or_else(|| BackupError::NameExhausted(original.to_path_buf()))?;
        info!("[SIM] Would back up {} to {}", original.display(), backup_path.display());
        Ok(BackupRecord {
            original_path: original.to_path_buf(),
            backup_path,
            created_at,
            simulated: true,
        })
    }
}

/// In-process copy, for a process that can write next to the original
#[derive(Debug, Default)]
pub struct FsStore;

impl BackupStore for FsStore {
    fn create(&self, original: &Path) -> Result<BackupRecord, BackupError> {
        let metadata = fs::metadata(original)
            .ok()
            .filter(|m| m.is_file())
            .ok_or_else(|| BackupError::SourceMissing(original.to_path_buf()))?;

        let created_at = Local::now();
        for candidate in backup_candidates(original, created_at.timestamp()) {
            // create_new reserves the name; a concurrent backup gets the next one
            let mut dest = match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(BackupError::Copy {
                        path: original.to_path_buf(),
                        source,
                    })
                }
            };

            let copied = File::open(original)
                .and_then(|mut src| io::copy(&mut src, &mut dest))
                .and_then(|_| dest.sync_all())
                .and_then(|_| fs::set_permissions(&candidate, metadata.permissions()));
            if let Err(source) = copied {
                let _ = fs::remove_file(&candidate);
                return Err(BackupError::Copy {
                    path: original.to_path_buf(),
                    source,
                });
            }

            verify_len(&candidate, metadata.len())?;

            return Ok(BackupRecord {
                original_path: original.to_path_buf(),
                backup_path: candidate,
                created_at,
                simulated: false,
            });
        }

        Err(BackupError::NameExhausted(original.to_path_buf()))
    }
}

/// A copy whose size does not match is removed, never left half-written
fn verify_len(candidate: &Path, expected: u64) -> Result<(), BackupError> {
    let verified = fs::metadata(candidate).map_or(false, |m| m.len() == expected);
    if !verified {
        let _ = fs::remove_file(candidate);
        return Err(BackupError::Verify(candidate.to_path_buf()));
    }
    Ok(())
}

/// `cp -p --no-clobber` through the executor with elevation, for an
/// unprivileged process backing up a root-owned file
pub struct ElevatedCopyStore {
    runner: Arc<dyn CommandRunner>,
    profile: Arc<EnvironmentProfile>,
    timeout_secs: u64,
}

impl ElevatedCopyStore {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Arc<EnvironmentProfile>, timeout_secs: u64) -> Self {
        Self {
            runner,
            profile,
            timeout_secs,
        }
    }
}

impl BackupStore for ElevatedCopyStore {
    fn create(&self, original: &Path) -> Result<BackupRecord, BackupError> {
        if !original.exists() {
            return Err(BackupError::SourceMissing(original.to_path_buf()));
        }

        let created_at = Local::now();
        let candidate = backup_candidates(original, created_at.timestamp())
            .find(|c| !c.exists())
            .ok_or_else(|| BackupError::NameExhausted(original.to_path_buf()))?;

        let spec = CommandSpec::new([
            "cp".to_string(),
            "-p".to_string(),
            "--no-clobber".to_string(),
            original.display().to_string(),
            candidate.display().to_string(),
        ])
        .timeout(self.timeout_secs)
        .elevated();

        let result = self.runner.execute(&spec, &self.profile);
        if !result.success() {
            return Err(BackupError::ElevatedCopy {
                path: original.to_path_buf(),
                detail: result.error_summary(),
            });
        }

        // cp --no-clobber exits 0 without copying when something else took
        // the name first; only identical contents count as a backup
        let compare = CommandSpec::new([
            "cmp".to_string(),
            "-s".to_string(),
            original.display().to_string(),
            candidate.display().to_string(),
        ])
        .timeout(self.timeout_secs)
        .elevated();
        let compared = self.runner.execute(&compare, &self.profile);
        if !compared.success() {
            warn!(
                "Backup {} does not match {} (exit {})",
                candidate.display(),
                original.display(),
                compared.exit_code
            );
            return Err(BackupError::Verify(candidate));
        }

        Ok(BackupRecord {
            original_path: original.to_path_buf(),
            backup_path: candidate,
            created_at,
            simulated: false,
        })
    }
}

/// Takes a backup before letting a mutation run, and remembers every backup
pub struct FileBackupGuard {
    store: Box<dyn BackupStore>,
    history: Mutex<Vec<BackupRecord>>,
}

impl FileBackupGuard {
    pub fn new(store: Box<dyn BackupStore>) -> Self {
        Self {
            store,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Pick the store that fits the profile
    pub fn for_profile(
        runner: Arc<dyn CommandRunner>,
        profile: Arc<EnvironmentProfile>,
        timeout_secs: u64,
    ) -> Self {
        let store: Box<dyn BackupStore> = if profile.is_simulated() {
            Box::new(SimulatedStore)
        } else if profile.is_privileged() {
            Box::new(FsStore)
        } else {
            Box::new(ElevatedCopyStore::new(runner, profile, timeout_secs))
        };
        Self::new(store)
    }

    pub fn backup(&self, path: &Path) -> Result<BackupRecord, BackupError> {
        let record = self.store.create(path).map_err(|e| {
            warn!("Backup of {} failed: {}", path.display(), e);
            e
        })?;

        info!(
            original = %record.original_path.display(),
            backup = %record.backup_path.display(),
            simulated = record.simulated,
            "Backup created"
        );
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(record)
    }

    /// Back up `path`, then run `mutation` with the record.
    ///
    /// `mutation` is never called when the backup fails.
    pub fn backup_then<T, F>(&self, path: &Path, mutation: F) -> Result<T, BackupError>
    where
        F: FnOnce(&BackupRecord) -> T,
    {
        let record = self.backup(path)?;
        Ok(mutation(&record))
    }

    pub fn history(&self) -> Vec<BackupRecord> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
