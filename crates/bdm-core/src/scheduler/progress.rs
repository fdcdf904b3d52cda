//! Progress reporting for a batch (bytes done, jobs done, rate).
//!
//! Consumers can compute rate = bytes_done / elapsed_secs; the CLI prints one
//! of these per tick.

/// Snapshot of batch progress (CLI-friendly).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressStats {
    /// Bytes transferred so far: finished runs plus in-flight workers.
    pub bytes_done: u64,
    /// Jobs in the list whose id is in the completed set.
    pub jobs_done: usize,
    /// Jobs whose last run failed or was cancelled and are not completed.
    pub jobs_failed: usize,
    /// Number of jobs in the list.
    pub job_count: usize,
    /// Workers currently running or paused.
    pub active: usize,
    /// Seconds since `start_all` (frozen once the batch finished).
    pub elapsed_secs: f64,
}

impl ProgressStats {
    /// Download rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Fraction of jobs completed, in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.job_count == 0 {
            return 1.0;
        }
        (self.jobs_done as f64 / self.job_count as f64).min(1.0)
    }

    /// Jobs neither completed nor failed.
    pub fn jobs_pending(&self) -> usize {
        self.job_count.saturating_sub(self.jobs_done + self.jobs_failed)
    }
}
