//! Background operation runner
//!
//! At most one operation is in flight. A start while busy is rejected, never
//! queued. The worker sends exactly one report over an mpsc channel that the
//! UI polls every tick.

use crate::config::Config;
use crate::security::{self, Operation, OperationContext, OperationReport};
use crate::system::{CommandRunner, EnvironmentProfile, FileBackupGuard};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use thiserror::Error;
use tracing::{info, warn};

/// Cooperative cancellation flag shared with a running operation.
///
/// Operations check it before every command. A process that is already
/// running is left alone; only its timeout kills it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    terminate: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record a request to kill the running process as well. The executor
    /// does not act on it; the request only shows up in the report.
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.cancel();
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("another operation is still running")]
    Busy,

    #[error("could not start worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Clears the busy flag when the worker is done, panicking or not
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct TaskRunner {
    runner: Arc<dyn CommandRunner>,
    profile: Arc<EnvironmentProfile>,
    config: Arc<Config>,
    backups: Arc<FileBackupGuard>,
    busy: Arc<AtomicBool>,
    current: Option<CancelToken>,
}

impl TaskRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, profile: Arc<EnvironmentProfile>, config: Arc<Config>) -> Self {
        let backups = Arc::new(FileBackupGuard::for_profile(
            Arc::clone(&runner),
            Arc::clone(&profile),
            config.timeouts.default,
        ));
        Self {
            runner,
            profile,
            config,
            backups,
            busy: Arc::new(AtomicBool::new(false)),
            current: None,
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    pub fn backups(&self) -> &FileBackupGuard {
        &self.backups
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Start `operation` on a worker thread
    pub fn start(&mut self, operation: Operation) -> Result<mpsc::Receiver<OperationReport>, TaskError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected {}: another operation is running", operation.id());
            return Err(TaskError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let token = CancelToken::new();
        self.current = Some(token.clone());

        let ctx = OperationContext::new(
            Arc::clone(&self.runner),
            Arc::clone(&self.profile),
            Arc::clone(&self.config),
            Arc::clone(&self.backups),
            token,
        );

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("op-{}", operation.id()))
            .spawn(move || {
                let report = security::execute(operation, ctx);
                // Free the slot before the report lands so the UI can start
                // the next operation as soon as it sees this one finish
                drop(guard);
                let _ = tx.send(report);
            })?;

        info!("Started {}", operation.id());
        Ok(rx)
    }

    /// Ask the running operation to stop before its next command
    pub fn cancel(&self) -> bool {
        match &self.current {
            Some(token) if self.is_busy() => {
                info!("Cancellation requested");
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.current.clone()
    }
}
