//! Immutable description of the resource to fetch.
//!
//! A `DownloadRequest` is what callers hand to a download operation and what the
//! resume store is keyed by. Its identity (`key`) is stable across process runs.

use url::Url;

/// HTTP method, URL and request headers for one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    method: String,
    url: Url,
    headers: Vec<(String, String)>,
}

impl DownloadRequest {
    /// Plain `GET` for `url` with no extra headers.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
        }
    }

    /// Parse `url` and build a `GET` request for it.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// Same request with a different method (stored upper-case).
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.trim().to_ascii_uppercase();
        self
    }

    /// Same request with `name: value` set, replacing any header of that name
    /// (compared case-insensitively).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.trim();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.trim().to_string()));
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of header `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Identity used to look up and persist resume state.
    ///
    /// Method plus the URL as normalized by the `url` crate (lower-case scheme and
    /// host, default port elided), without the fragment, which is never sent.
    /// Request headers are deliberately not part of the identity so that a
    /// conditional rebuild of the same request maps to the same record.
    pub fn key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        format!("{} {}", self.method, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_host_case_and_default_port() {
        let a = DownloadRequest::parse("HTTP://Example.COM:80/pkg/update.bin").unwrap();
        let b = DownloadRequest::parse("http://example.com/pkg/update.bin").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "GET http://example.com/pkg/update.bin");
    }

    #[test]
    fn key_ignores_fragment_and_headers() {
        let a = DownloadRequest::parse("https://example.com/f#part").unwrap();
        let b = DownloadRequest::parse("https://example.com/f")
            .unwrap()
            .with_header("Range", "bytes=10-");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_depends_on_method() {
        let get = DownloadRequest::parse("https://example.com/f").unwrap();
        let post = get.clone().with_method("post");
        assert_eq!(post.method(), "POST");
        assert_ne!(get.key(), post.key());
    }

    #[test]
    fn with_header_replaces_case_insensitively() {
        let r = DownloadRequest::parse("https://example.com/f")
            .unwrap()
            .with_header("range", "bytes=1-")
            .with_header("Range", "bytes=5-");
        assert_eq!(r.headers().len(), 1);
        assert_eq!(r.header("RANGE"), Some("bytes=5-"));
    }
}
