//! In-memory transport and polling helpers for scheduler and worker tests.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::transfer::{create_destination, Transport};

/// Blocks readers at the middle of a body until released.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub(crate) fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self, abort: &AtomicBool) -> io::Result<()> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            if abort.load(Ordering::Acquire) {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "aborted"));
            }
            open = self.cv.wait_timeout(open, Duration::from_millis(5)).unwrap().0;
        }
        Ok(())
    }
}

#[derive(Clone)]
enum Source {
    Body(Arc<Vec<u8>>),
    Gated(Arc<Vec<u8>>, Arc<Gate>),
    /// `open_read` fails with this kind.
    Unreachable(io::ErrorKind),
    /// First half is delivered, then the read fails.
    ResetMidway(Arc<Vec<u8>>),
}

/// Serves registered URLs from memory and writes destinations to disk,
/// recording how streams were opened.
#[derive(Default)]
pub(crate) struct MemoryTransport {
    sources: Mutex<HashMap<String, Source>>,
    open_readers: Arc<AtomicUsize>,
    max_open_readers: Arc<AtomicUsize>,
    reads_opened: Mutex<HashMap<String, usize>>,
    writes_opened: Mutex<HashMap<PathBuf, usize>>,
}

impl MemoryTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add(&self, url: &str, body: Vec<u8>) {
        self.insert(url, Source::Body(Arc::new(body)));
    }

    pub(crate) fn add_gated(&self, url: &str, body: Vec<u8>) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.insert(url, Source::Gated(Arc::new(body), Arc::clone(&gate)));
        gate
    }

    pub(crate) fn add_unreachable(&self, url: &str) {
        self.insert(url, Source::Unreachable(io::ErrorKind::ConnectionRefused));
    }

    pub(crate) fn add_reset_midway(&self, url: &str, body: Vec<u8>) {
        self.insert(url, Source::ResetMidway(Arc::new(body)));
    }

    pub(crate) fn max_open_readers(&self) -> usize {
        self.max_open_readers.load(Ordering::SeqCst)
    }

    pub(crate) fn reads_of(&self, url: &str) -> usize {
        self.reads_opened.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn writes_of(&self, path: &Path) -> usize {
        self.writes_opened.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn insert(&self, url: &str, source: Source) {
        self.sources.lock().unwrap().insert(url.to_string(), source);
    }
}

impl Transport for MemoryTransport {
    fn open_read(&self, url: &str, abort: &Arc<AtomicBool>) -> io::Result<Box<dyn Read + Send>> {
        *self.reads_opened.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let source = self
            .sources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, url.to_string()))?;
        let (body, gate, fail_midway) = match source {
            Source::Body(body) => (body, None, false),
            Source::Gated(body, gate) => (body, Some(gate), false),
            Source::Unreachable(kind) => return Err(io::Error::new(kind, url.to_string())),
            Source::ResetMidway(body) => (body, None, true),
        };
        let now = self.open_readers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_readers.fetch_max(now, Ordering::SeqCst);
        let split = body.len() / 2;
        Ok(Box::new(MemoryReader {
            body,
            pos: 0,
            split,
            gate,
            fail_midway,
            abort: Arc::clone(abort),
            open_readers: Arc::clone(&self.open_readers),
        }))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        *self.writes_opened.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
        Ok(Box::new(create_destination(path)?))
    }
}

struct MemoryReader {
    body: Arc<Vec<u8>>,
    pos: usize,
    split: usize,
    gate: Option<Arc<Gate>>,
    fail_midway: bool,
    abort: Arc<AtomicBool>,
    open_readers: Arc<AtomicUsize>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos == self.split {
            if let Some(gate) = self.gate.take() {
                gate.wait(&self.abort)?;
            }
            if self.fail_midway {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
            }
        }
        let end = if self.pos < self.split { self.split } else { self.body.len() };
        let n = buf.len().min(end - self.pos);
        buf[..n].copy_from_slice(&self.body[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for MemoryReader {
    fn drop(&mut self) {
        self.open_readers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic body of `len` bytes, distinct per `seed`.
pub(crate) fn body(seed: u8, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Polls `cond` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}
