//! Per-job control signals: pause/resume and an abort token.
//!
//! Every worker owns a `JobSignal`. The scheduler flips it from control
//! operations; the worker checks the abort token between chunks and parks on
//! the condition variable while paused. The abort token is also handed to the
//! transport so a blocked read can be torn down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Error returned when a download is stopped by user (stop/cancel).
#[derive(Debug, thiserror::Error)]
#[error("job aborted by user")]
pub struct JobAborted;

/// Pause flag guarded by a mutex, plus the shared abort token.
#[derive(Debug, Default)]
pub struct JobSignal {
    paused: Mutex<bool>,
    wake: Condvar,
    abort: Arc<AtomicBool>,
}

impl JobSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that becomes true once `cancel` is called.
    pub fn abort_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn pause(&self) {
        *self.lock() = true;
    }

    /// Clears the pause flag and wakes the waiting worker. Safe no-op when not paused.
    pub fn resume(&self) {
        let mut paused = self.lock();
        if *paused {
            *paused = false;
            self.wake.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.lock()
    }

    /// Sets the abort token and wakes a worker parked in `wait_while_paused`.
    pub fn cancel(&self) {
        // Taken so the store cannot slip between the waiter's check and its wait.
        let _paused = self.lock();
        self.abort.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Blocks while paused. Returns `Err(JobAborted)` if the job was cancelled
    /// before or during the wait.
    pub fn wait_while_paused(&self) -> Result<(), JobAborted> {
        let guard = self.lock();
        let _guard = self
            .wake
            .wait_while(guard, |paused| *paused && !self.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            Err(JobAborted)
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.paused.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Default path for the control socket of a running batch (XDG state dir).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("bdm")?.get_state_home();
    Ok(dir.join("control.sock"))
}
