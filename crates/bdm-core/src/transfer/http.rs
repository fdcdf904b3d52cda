//! libcurl-backed transport.
//!
//! curl pushes body data through a callback, so each `open_read` runs the
//! transfer on its own thread and hands chunks to the worker over a bounded
//! channel. The worker sees a plain blocking `Read`. The transfer stops when
//! the abort token is set (checked from curl's progress callback) or when the
//! reader is dropped.

use curl::easy::Easy;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{create_destination, Transport};

/// Number of body chunks buffered between curl and the worker.
const CHANNEL_DEPTH: usize = 64;

type Chunk = io::Result<Vec<u8>>;

/// HTTP(S)/FTP/file transport built on libcurl.
#[derive(Debug, Clone, Copy)]
pub struct CurlTransport {
    connect_timeout: Duration,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    fn build_easy(&self, url: &str) -> Result<Easy, curl::Error> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        // HTTP >= 400 fails the transfer instead of streaming an error page.
        easy.fail_on_error(true)?;
        easy.connect_timeout(self.connect_timeout)?;
        // Abort if throughput drops below 1 KiB/s for 60s.
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.progress(true)?;
        Ok(easy)
    }
}

impl Transport for CurlTransport {
    fn open_read(&self, url: &str, abort: &Arc<AtomicBool>) -> io::Result<Box<dyn Read + Send>> {
        let easy = self.build_easy(url).map_err(|e| curl_to_io(url, &e))?;
        let (tx, rx) = mpsc::sync_channel::<Chunk>(CHANNEL_DEPTH);
        let closed = Arc::new(AtomicBool::new(false));
        let abort = Arc::clone(abort);
        let closed_flag = Arc::clone(&closed);
        let url = url.to_string();
        thread::Builder::new()
            .name("bdm-curl".to_string())
            .spawn(move || perform(easy, &url, tx, &abort, &closed_flag))?;
        Ok(Box::new(CurlReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            closed,
        }))
    }

    fn open_write(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(BufWriter::new(create_destination(path)?)))
    }
}

/// Runs the transfer to completion on the curl thread. Dropping `tx` at the
/// end is what signals end-of-stream to the reader.
fn perform(mut easy: Easy, url: &str, tx: SyncSender<Chunk>, abort: &AtomicBool, closed: &AtomicBool) {
    let result = stream_body(&mut easy, &tx, abort, closed);
    let Err(e) = result else {
        tracing::debug!(url, "transfer body complete");
        return;
    };
    if closed.load(Ordering::Relaxed) {
        // Reader is gone; nobody to report to.
        return;
    }
    let err = if e.is_http_returned_error() {
        let code = easy.response_code().unwrap_or(0);
        io::Error::new(io::ErrorKind::Other, format!("{}: HTTP {}", url, code))
    } else {
        curl_to_io(url, &e)
    };
    let _ = tx.send(Err(err));
}

fn stream_body(
    easy: &mut Easy,
    tx: &SyncSender<Chunk>,
    abort: &AtomicBool,
    closed: &AtomicBool,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.write_function(|data| match tx.send(Ok(data.to_vec())) {
        Ok(()) => Ok(data.len()),
        // Reader dropped: short write makes curl abort.
        Err(_) => Ok(0),
    })?;
    transfer.progress_function(|_, _, _, _| {
        !abort.load(Ordering::Relaxed) && !closed.load(Ordering::Relaxed)
    })?;
    transfer.perform()
}

fn curl_to_io(url: &str, e: &curl::Error) -> io::Error {
    let kind = if e.is_aborted_by_callback() {
        io::ErrorKind::ConnectionAborted
    } else if e.is_operation_timedout() {
        io::ErrorKind::TimedOut
    } else if e.is_couldnt_connect() {
        io::ErrorKind::ConnectionRefused
    } else if e.is_file_couldnt_read_file() {
        io::ErrorKind::NotFound
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, format!("{}: {}", url, e))
}

/// Blocking reader over the chunks produced by the curl thread.
struct CurlReader {
    rx: Receiver<Chunk>,
    chunk: Vec<u8>,
    pos: usize,
    closed: Arc<AtomicBool>,
}

impl Read for CurlReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => return Err(e),
                // Sender dropped without an error: clean end of body.
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Drop for CurlReader {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(reader: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn reads_local_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let body: Vec<u8> = (0u8..=255).cycle().take(200 * 1024).collect();
        std::fs::write(&src, &body).unwrap();
        let url = format!("file://{}", src.display());

        let abort = Arc::new(AtomicBool::new(false));
        let mut reader = CurlTransport::new().open_read(&url, &abort).unwrap();
        assert_eq!(read_all(reader.as_mut()).unwrap(), body);
    }

    #[test]
    fn missing_local_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().join("nope.bin").display());
        let abort = Arc::new(AtomicBool::new(false));
        let mut reader = CurlTransport::new().open_read(&url, &abort).unwrap();
        let err = read_all(reader.as_mut()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("nope.bin"));
    }

    #[test]
    fn reader_splits_chunks_across_small_buffers() {
        let (tx, rx) = mpsc::sync_channel(4);
        tx.send(Ok(b"hello".to_vec())).unwrap();
        tx.send(Ok(b" world".to_vec())).unwrap();
        drop(tx);
        let mut reader = CurlReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            closed: Arc::new(AtomicBool::new(false)),
        };
        let mut buf = [0u8; 3];
        let mut out = Vec::new();
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn dropping_reader_marks_closed() {
        let (_tx, rx) = mpsc::sync_channel::<Chunk>(1);
        let closed = Arc::new(AtomicBool::new(false));
        let reader = CurlReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
            closed: Arc::clone(&closed),
        };
        drop(reader);
        assert!(closed.load(Ordering::Relaxed));
    }
}
