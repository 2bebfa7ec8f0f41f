//! Response metadata captured from the transport and persisted with resume state.

use serde::{Deserialize, Serialize};

/// Status and headers of a response.
///
/// `status` is `None` when the transport produced no `HTTP/x nnn` status line,
/// i.e. the response was not a well-formed HTTP response (`file://`, a broken
/// server, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    pub status: Option<u32>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parse raw header lines as delivered by the transport (status line first,
    /// then `Name: value` lines). Blank and malformed lines are skipped.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut head = ResponseHead::default();
        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            if let Some(code) = parse_status_line(line) {
                head.status = Some(code);
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                head.headers.push((name.to_string(), value.trim().to_string()));
            }
        }
        head
    }

    /// True if a status line was seen.
    pub fn is_http(&self) -> bool {
        self.status.is_some()
    }

    /// First value of header `name` (ASCII case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `ETag` exactly as the server sent it (quotes and weak prefix kept), which
    /// is the form `If-Range` must echo back.
    pub fn etag(&self) -> Option<&str> {
        self.header("etag").filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.parse().ok()
    }
}

/// Status code from a line like `HTTP/1.1 206 Partial Content` or `HTTP/2 200`.
pub fn parse_status_line(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    let mut parts = rest.split_whitespace();
    let _version = parts.next()?;
    let code = parts.next()?.parse::<u32>().ok()?;
    (100..=999).contains(&code).then_some(code)
}
