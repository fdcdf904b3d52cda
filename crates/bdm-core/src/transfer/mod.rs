//! Byte-transfer primitive used by workers.
//!
//! A worker only needs "give me a reader for this URL" and "give me a writer
//! for this path". Keeping that behind a trait lets the scheduler be driven by
//! libcurl in production and by in-memory sources in tests.

mod http;

pub use http::CurlTransport;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Opens the two ends of one job's transfer.
pub trait Transport: Send + Sync {
    /// Opens a byte stream for `url`. Implementations that can block inside a
    /// read should watch `abort` and fail the pending read once it is set.
    fn open_read(&self, url: &str, abort: &Arc<AtomicBool>) -> io::Result<Box<dyn Read + Send>>;

    /// Opens `path` for writing from offset 0, truncating any previous content.
    fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;
}

/// Creates (or truncates) the destination file, creating parent directories.
pub fn create_destination(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}
