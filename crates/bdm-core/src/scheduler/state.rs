//! Batch bookkeeping guarded by the scheduler mutex.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::job::JobId;
use crate::worker::Worker;

use super::BatchConfig;

/// Everything the completion handler reads or writes.
///
/// Invariants: `active.len() + held_slots <= max_concurrency`; a job id is
/// never both in `active` and in `completed`; `next_index` only grows
/// between two `start_all` calls.
#[derive(Debug)]
pub(super) struct BatchState {
    pub(super) urls: Vec<String>,
    pub(super) completed: HashSet<JobId>,
    pub(super) active: HashMap<JobId, Worker>,
    /// Last finished run per job, for status queries.
    pub(super) history: HashMap<JobId, Worker>,
    pub(super) destination_dir: PathBuf,
    pub(super) max_concurrency: usize,
    pub(super) next_index: usize,
    /// Slots kept free for a job that is being restarted.
    pub(super) held_slots: usize,
    pub(super) paused: bool,
    pub(super) stopped: bool,
    pub(super) finished: bool,
    pub(super) start_time: Option<SystemTime>,
    pub(super) finish_time: Option<SystemTime>,
    pub(super) byte_count: u64,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            completed: HashSet::new(),
            active: HashMap::new(),
            history: HashMap::new(),
            destination_dir: PathBuf::new(),
            max_concurrency: 1,
            next_index: 0,
            held_slots: 0,
            paused: false,
            stopped: false,
            finished: false,
            start_time: None,
            finish_time: None,
            byte_count: 0,
        }
    }
}

impl BatchState {
    /// Replaces the job list and resets run bookkeeping. Caller checks that
    /// no workers are active.
    pub(super) fn reconfigure(&mut self, config: BatchConfig) {
        *self = BatchState {
            urls: config.urls,
            completed: config.completed_ids.into_iter().collect(),
            destination_dir: config.destination_dir,
            max_concurrency: config.max_concurrency.max(1),
            ..BatchState::default()
        };
    }

    pub(super) fn is_saturated(&self) -> bool {
        self.active.len() + self.held_slots >= self.max_concurrency
    }

    /// Neither done nor already running.
    pub(super) fn is_eligible(&self, id: JobId) -> bool {
        !self.completed.contains(&id) && !self.active.contains_key(&id)
    }

    /// No worker running, no slot held for a restart, and the scan has
    /// passed the end of the list or the batch is stopped.
    pub(super) fn is_drained(&self) -> bool {
        self.active.is_empty()
            && self.held_slots == 0
            && (self.stopped || self.next_index >= self.urls.len())
    }

    pub(super) fn mark_finished(&mut self) {
        self.finished = true;
        self.finish_time = Some(SystemTime::now());
        tracing::info!(
            "batch finished: {} of {} job(s) completed, {} bytes",
            self.completed.len(),
            self.urls.len(),
            self.byte_count
        );
    }
}
