//! The chunked copy loop run by each worker thread.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::control::JobSignal;
use crate::job::Job;
use crate::transfer::Transport;

use super::JobError;

/// Streams `job.url` into `job.destination` in `chunk_size` reads.
///
/// Cancellation is checked before every read and after every pause; a read
/// that fails once the abort token is set counts as cancellation rather than
/// a transfer error. Both streams are dropped (closed) on return; close
/// errors are not reported.
pub(super) fn copy_stream(
    job: &Job,
    transport: &dyn Transport,
    signal: &JobSignal,
    chunk_size: usize,
    bytes_transferred: &AtomicU64,
) -> Result<(), JobError> {
    if signal.is_cancelled() {
        return Err(JobError::Cancelled);
    }
    let abort = signal.abort_token();
    let mut reader = transport.open_read(&job.url, &abort)?;
    let mut writer = transport.open_write(&job.destination)?;
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        if signal.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) if signal.is_cancelled() => return Err(JobError::Cancelled),
            Err(e) => return Err(e.into()),
        };
        writer.write_all(&buf[..n])?;
        bytes_transferred.fetch_add(n as u64, Ordering::Relaxed);
        signal.wait_while_paused()?;
    }

    writer.flush()?;
    Ok(())
}
