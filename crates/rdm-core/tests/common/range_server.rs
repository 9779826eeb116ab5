//! Minimal HTTP/1.1 server with HEAD and Range GET support for integration
//! tests.
//!
//! Serves a single static body and records every request so tests can assert
//! exactly which ranges were fetched (and how often). Responses carry
//! `Connection: close` so client-side connection pooling never sees a stale
//! socket.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct RangeServer {
    /// Base URL of the served file, e.g. "http://127.0.0.1:12345/data.bin".
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl RangeServer {
    /// Requests seen so far, as "METHOD <range>" lines (range "-" when the
    /// request carried no Range header).
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// How many GETs asked for exactly this Range header value.
    pub fn count_range(&self, range: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.as_str() == format!("GET {}", range))
            .count()
    }
}

/// Starts a server in a background thread serving `body`. Runs until the
/// process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_delay(body, None)
}

/// Like `start`, but each GET sleeps `delay` before responding, so tests can
/// pause a transfer while a fetch is reliably in flight.
pub fn start_with_delay(body: Vec<u8>, delay: Option<Duration>) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let server = RangeServer {
        url: format!("http://127.0.0.1:{}/data.bin", port),
        requests: Arc::clone(&requests),
    };
    let body = Arc::new(body);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let requests = Arc::clone(&requests);
            thread::spawn(move || handle(stream, &body, &requests, delay));
        }
    });
    server
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    requests: &Mutex<Vec<String>>,
    delay: Option<Duration>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    requests.lock().unwrap().push(format!(
        "{} {}",
        method,
        range.map(|(s, e)| format!("bytes={}-{}", s, e)).as_deref().unwrap_or("-")
    ));
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
            total
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let (status, content_range, slice) = match range {
            Some((start, end_incl)) => {
                let start = start.min(total);
                let end_incl = end_incl.min(total.saturating_sub(1));
                if start > end_incl {
                    (
                        "416 Range Not Satisfiable",
                        format!("bytes */{}", total),
                        &body[0..0],
                    )
                } else {
                    let start = start as usize;
                    let end_excl = (end_incl + 1) as usize;
                    (
                        "206 Partial Content",
                        format!("bytes {}-{}/{}", start, end_excl - 1, total),
                        &body[start..end_excl],
                    )
                }
            }
            None => (
                "200 OK",
                format!("bytes 0-{}/{}", total.saturating_sub(1), total),
                body,
            ),
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
            status,
            slice.len(),
            content_range
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }

    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
}

/// Returns (method, optional (start, end_inclusive) for `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(spec) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = spec.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
