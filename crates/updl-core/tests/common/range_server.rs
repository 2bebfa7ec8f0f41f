//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one body under any path with an `ETag`, honours `Range: bytes=N-`
//! guarded by `If-Range`, and can be told to stall mid-body or answer every
//! request with a fixed status. Every request it sees is recorded.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the server saw in one request.
#[derive(Debug, Clone, Default)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub range: Option<String>,
    pub if_range: Option<String>,
}

#[derive(Debug)]
struct State {
    body: Vec<u8>,
    etag: Option<String>,
    support_ranges: bool,
    /// Send only this many body bytes, then hold the connection open.
    stall_after: Option<usize>,
    /// Answer everything with this status and a short text body.
    fixed_status: Option<u16>,
    /// Answer the next `.0` requests with status `.1`, then serve normally.
    failures: (usize, u16),
    seen: Vec<SeenRequest>,
}

#[derive(Clone)]
pub struct RangeServer {
    base: String,
    state: Arc<Mutex<State>>,
}

impl RangeServer {
    /// Serve `body` with `ETag: <etag>` (pass the quoted form, e.g. `"\"abc\""`).
    pub fn start(body: impl Into<Vec<u8>>, etag: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(State {
            body: body.into(),
            etag: etag.map(String::from),
            support_ranges: true,
            stall_after: None,
            fixed_status: None,
            failures: (0, 0),
            seen: Vec::new(),
        }));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = Arc::clone(&shared);
                thread::spawn(move || handle(stream, &state));
            }
        });
        Self {
            base: format!("http://127.0.0.1:{}", port),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn set_body(&self, body: impl Into<Vec<u8>>, etag: Option<&str>) {
        let mut s = self.state.lock().unwrap();
        s.body = body.into();
        s.etag = etag.map(String::from);
    }

    pub fn set_support_ranges(&self, on: bool) {
        self.state.lock().unwrap().support_ranges = on;
    }

    pub fn set_stall_after(&self, bytes: Option<usize>) {
        self.state.lock().unwrap().stall_after = bytes;
    }

    pub fn set_fixed_status(&self, status: Option<u16>) {
        self.state.lock().unwrap().fixed_status = status;
    }

    /// Fail the next `count` requests with `status` and a short text body.
    pub fn fail_next(&self, count: usize, status: u16) {
        self.state.lock().unwrap().failures = (count, status);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().unwrap().seen.clone()
    }

    pub fn last_request(&self) -> SeenRequest {
        self.requests().pop().expect("server saw no request")
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        404 => "Not Found",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn handle(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(text) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let seen = parse_request(text);

    let (status, headers, payload, stall_after) = {
        let mut s = state.lock().unwrap();
        s.seen.push(seen.clone());
        let transient = match s.failures {
            (left, code) if left > 0 => {
                s.failures = (left - 1, code);
                Some(code)
            }
            _ => None,
        };
        if let Some(code) = s.fixed_status.or(transient) {
            (code, String::new(), b"nope".to_vec(), None)
        } else {
            let (status, payload, content_range) = select(&s, &seen);
            let mut headers = String::new();
            if let Some(etag) = &s.etag {
                headers.push_str(&format!("ETag: {}\r\n", etag));
            }
            if let Some(cr) = content_range {
                headers.push_str(&format!("Content-Range: {}\r\n", cr));
            }
            if s.support_ranges {
                headers.push_str("Accept-Ranges: bytes\r\n");
            }
            (status, headers, payload, s.stall_after)
        }
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        status,
        reason(status),
        payload.len(),
        headers
    );
    if stream.write_all(head.as_bytes()).is_err() || seen.method.eq_ignore_ascii_case("HEAD") {
        return;
    }
    match stall_after {
        Some(limit) if limit < payload.len() => {
            let _ = stream.write_all(&payload[..limit]);
            let _ = stream.flush();
            // Hold the connection until the client gives up.
            let mut sink = [0u8; 1];
            let _ = stream.set_read_timeout(Some(Duration::from_secs(30)));
            let _ = stream.read(&mut sink);
        }
        _ => {
            let _ = stream.write_all(&payload);
        }
    }
}

/// Status, body slice and Content-Range for a GET against the current state.
fn select(s: &State, req: &SeenRequest) -> (u16, Vec<u8>, Option<String>) {
    let total = s.body.len();
    let validator_ok = match (&req.if_range, &s.etag) {
        (None, _) => true,
        (Some(sent), Some(current)) => sent == current,
        (Some(_), None) => false,
    };
    let start = req
        .range
        .as_deref()
        .and_then(|r| r.trim().strip_prefix("bytes="))
        .and_then(|r| r.strip_suffix('-'))
        .and_then(|r| r.trim().parse::<usize>().ok());
    match start {
        Some(start) if s.support_ranges && validator_ok => {
            if start >= total {
                (416, Vec::new(), Some(format!("bytes */{}", total)))
            } else {
                (
                    206,
                    s.body[start..].to_vec(),
                    Some(format!("bytes {}-{}/{}", start, total - 1, total)),
                )
            }
        }
        _ => (200, s.body.clone(), None),
    }
}

fn parse_request(text: &str) -> SeenRequest {
    let mut lines = text.split("\r\n");
    let mut req = SeenRequest::default();
    if let Some(first) = lines.next() {
        let mut parts = first.split_whitespace();
        req.method = parts.next().unwrap_or("").to_string();
        req.path = parts.next().unwrap_or("").to_string();
    }
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("range") {
                req.range = Some(value.trim().to_string());
            } else if name.eq_ignore_ascii_case("if-range") {
                req.if_range = Some(value.trim().to_string());
            }
        }
    }
    req
}
