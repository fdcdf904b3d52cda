//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths with GET; anything else is 404. Paths added
//! with `slow` trickle their body so a test can stop them mid-transfer.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Entry {
    body: Vec<u8>,
    /// Pause between 1 KiB pieces of the body.
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct StaticServer {
    entries: HashMap<String, Entry>,
}

impl StaticServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` at `path` (e.g. "/a.bin").
    pub fn file(mut self, path: &str, body: Vec<u8>) -> Self {
        self.entries.insert(path.to_string(), Entry { body, delay: None });
        self
    }

    /// Serves `body` at `path`, one KiB every `delay`.
    pub fn slow(mut self, path: &str, body: Vec<u8>, delay: Duration) -> Self {
        self.entries.insert(path.to_string(), Entry { body, delay: Some(delay) });
        self
    }

    /// Starts serving in a background thread and returns the base URL without
    /// a trailing slash (e.g. "http://127.0.0.1:12345"). Runs until the
    /// process exits.
    pub fn start(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let entries = Arc::new(self.entries);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let entries = Arc::clone(&entries);
                thread::spawn(move || handle(stream, &entries));
            }
        });
        format!("http://127.0.0.1:{}", port)
    }
}

fn handle(mut stream: TcpStream, entries: &HashMap<String, Entry>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(request) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }
    let Some(entry) = entries.get(path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    };
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        entry.body.len()
    );
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }
    match entry.delay {
        None => {
            let _ = stream.write_all(&entry.body);
        }
        Some(delay) => {
            for piece in entry.body.chunks(1024) {
                if stream.write_all(piece).is_err() || stream.flush().is_err() {
                    return;
                }
                thread::sleep(delay);
            }
        }
    }
}
