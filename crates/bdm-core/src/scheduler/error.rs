//! Errors returned by scheduler control operations.

/// Batch-level errors. A failing job never shows up here; job failures are
/// recorded on the job itself.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start_all` with an empty URL list. Reported, never fatal.
    #[error("no URLs were given; batch not started")]
    NoJobs,
    /// The operation needs a batch with no active workers.
    #[error("batch has active workers; stop it first")]
    Busy,
    /// Index outside the URL list.
    #[error("no job at index {0}")]
    UnknownJob(usize),
}
