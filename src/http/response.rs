//! Response representations.
//!
//! # Responsibilities
//! - `Response`: opaque, pre-serialized bytes produced by priority-match handlers
//! - `ChainResponse`: mutable status/headers/body shared by an ordered chain
//! - Serialize structured responses to HTTP/1.1 bytes
//!
//! # Design Decisions
//! - The engine never rewrites a handler's `Response`; bytes pass through as-is
//! - `ChainResponse` always carries a computed `Content-Length`
//! - Header names keep their first spelling; values are last-write-wins

use std::fmt::Write as _;

use crate::http::context::Context;

/// A serialized response, written to the connection unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub data: Vec<u8>,
}

impl Response {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Status code parsed from an HTTP status line, if the payload has one.
    pub fn status(&self) -> Option<u16> {
        let line_end = self.data.iter().position(|b| *b == b'\n')?;
        let line = std::str::from_utf8(&self.data[..line_end]).ok()?;
        let mut parts = line.split_whitespace();
        parts.next().filter(|p| p.starts_with("HTTP/"))?;
        parts.next()?.parse().ok()
    }
}

impl From<ChainResponse> for Response {
    fn from(value: ChainResponse) -> Self {
        Response::new(value.serialize())
    }
}

/// Structured response mutated in turn by ordered-chain handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainResponse {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// State shared between the handlers of one chain run.
    pub context: Context,
}

impl Default for ChainResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ChainResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            context: Context::new(),
        }
    }

    /// Whether the status is in the 2xx class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Set a header, replacing any value under the same (case-insensitive) name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(index).1)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as an HTTP/1.1 message.
    pub fn serialize(&self) -> Vec<u8> {
        let mut head = String::new();
        let _ = write!(head, "HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            let _ = write!(head, "{name}: {value}\r\n");
        }
        let _ = write!(head, "Content-Length: {}\r\n\r\n", self.body.len());

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

/// Canonical reason phrase for common status codes.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// A bodyless response that asks the client to close the connection.
pub fn status_only(status: u16) -> Response {
    let mut chain = ChainResponse::new(status);
    chain.set_header("Connection", "close");
    chain.into()
}
