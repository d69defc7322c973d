//! Structured HTTP request as emitted by parser modules.
//!
//! # Responsibilities
//! - Hold the parsed message (method, url, headers, body)
//! - Derive routing-relevant fields once (path, query arguments, accept lists)
//! - Stay immutable after construction
//!
//! # Design Decisions
//! - Header names are lower-cased, so last-write-wins is case-insensitive
//! - Derived fields are computed by [`RequestBuilder::build`], never set directly
//! - Malformed quality values are ignored (treated as 1.0) rather than rejected

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::http::context::Context;

/// HTTP/1.1 request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Patch,
    Link,
    Unlink,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Options => "OPTIONS",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
            Method::Link => "LINK",
            Method::Unlink => "UNLINK",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for method tokens outside the supported set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported method '{0}'")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(Method::Options),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "TRACE" => Ok(Method::Trace),
            "CONNECT" => Ok(Method::Connect),
            "PATCH" => Ok(Method::Patch),
            "LINK" => Ok(Method::Link),
            "UNLINK" => Ok(Method::Unlink),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

/// An accepted media range, e.g. `text/html;level=1;q=0.7`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    /// Media type, e.g. `text/html` or `*/*`.
    pub media_type: String,
    /// `0.0` to `1.0`.
    pub quality: f64,
    /// Parameters other than `q`.
    pub extension: BTreeMap<String, String>,
}

/// An accepted language, e.g. `en-US;q=0.8`.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRange {
    pub language: String,
    pub quality: f64,
}

/// An accepted content coding, e.g. `gzip`.
#[derive(Debug, Clone, PartialEq)]
pub struct Coding {
    pub content_coding: String,
    pub quality: f64,
}

/// An immutable HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    path: String,
    arguments: BTreeMap<String, String>,
    protocol: String,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    data: Vec<u8>,
    lines: Vec<String>,
    host: String,
    user_agent: String,
    accept: Vec<MediaRange>,
    accept_language: Vec<LanguageRange>,
    accept_encoding: Vec<Coding>,
    close_connection: bool,
    upgrade_insecure_requests: bool,
    context: Context,
}

impl Request {
    /// Start building a request for `method` and raw `url`.
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Raw request target, including the query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request target without query string or fragment.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query arguments decoded from the url.
    pub fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// All headers, keyed by lower-cased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Raw bytes of the whole message as received.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The message head, line by line.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Media ranges from the `Accept` header, in header order.
    pub fn accept(&self) -> &[MediaRange] {
        &self.accept
    }

    pub fn accept_language(&self) -> &[LanguageRange] {
        &self.accept_language
    }

    pub fn accept_encoding(&self) -> &[Coding] {
        &self.accept_encoding
    }

    /// Whether the connection must be closed after the response.
    pub fn close_connection(&self) -> bool {
        self.close_connection
    }

    pub fn upgrade_insecure_requests(&self) -> bool {
        self.upgrade_insecure_requests
    }

    /// State attached by the parser or connection wrapper.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

/// Builder deriving a [`Request`]'s computed fields.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    protocol: String,
    headers: BTreeMap<String, String>,
    body: Option<Vec<u8>>,
    data: Vec<u8>,
    lines: Vec<String>,
    context: Context,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            protocol: "HTTP/1.1".to_string(),
            headers: BTreeMap::new(),
            body: None,
            data: Vec::new(),
            lines: Vec::new(),
            context: Context::new(),
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Add a header; a later value for the same name replaces the earlier one.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.trim().to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Raw message bytes, kept for modules that need the exact input.
    pub fn data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn lines(mut self, lines: Vec<String>) -> Self {
        self.lines = lines;
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Request {
        let target = self.url.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (target.to_string(), None),
        };
        let arguments = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        let header = |name: &str| self.headers.get(name).map(String::as_str);

        let accept = header("accept")
            .map(|value| {
                parse_weighted(value)
                    .into_iter()
                    .map(|item| MediaRange {
                        media_type: item.token.to_ascii_lowercase(),
                        quality: item.quality,
                        extension: item.params,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let accept_language = header("accept-language")
            .map(|value| {
                parse_weighted(value)
                    .into_iter()
                    .map(|item| LanguageRange {
                        language: item.token,
                        quality: item.quality,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let accept_encoding = header("accept-encoding")
            .map(|value| {
                parse_weighted(value)
                    .into_iter()
                    .map(|item| Coding {
                        content_coding: item.token.to_ascii_lowercase(),
                        quality: item.quality,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let connection_tokens: Vec<String> = header("connection")
            .map(|value| {
                value
                    .split(',')
                    .map(|t| t.trim().to_ascii_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        let close_connection = connection_tokens.iter().any(|t| t == "close")
            || (self.protocol.eq_ignore_ascii_case("HTTP/1.0")
                && !connection_tokens.iter().any(|t| t == "keep-alive"));
        let upgrade_insecure_requests =
            header("upgrade-insecure-requests").map(str::trim) == Some("1");

        let host = header("host").unwrap_or_default().to_string();
        let user_agent = header("user-agent").unwrap_or_default().to_string();

        Request {
            method: self.method,
            url: self.url,
            path,
            arguments,
            protocol: self.protocol,
            host,
            user_agent,
            accept,
            accept_language,
            accept_encoding,
            close_connection,
            upgrade_insecure_requests,
            headers: self.headers,
            body: self.body,
            data: self.data,
            lines: self.lines,
            context: self.context,
        }
    }
}

struct WeightedItem {
    token: String,
    quality: f64,
    params: BTreeMap<String, String>,
}

/// Parse a comma-separated list of `token;param=value;q=0.5` items.
fn parse_weighted(value: &str) -> Vec<WeightedItem> {
    value
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let token = parts.next()?.trim();
            if token.is_empty() {
                return None;
            }
            let mut quality = 1.0;
            let mut params = BTreeMap::new();
            for param in parts {
                let Some((key, val)) = param.split_once('=') else {
                    continue;
                };
                let key = key.trim().to_ascii_lowercase();
                let val = val.trim().trim_matches('"');
                if key == "q" {
                    if let Ok(q) = val.parse::<f64>() {
                        if q.is_finite() {
                            quality = q.clamp(0.0, 1.0);
                        }
                    }
                } else {
                    params.insert(key, val.to_string());
                }
            }
            Some(WeightedItem {
                token: token.to_string(),
                quality,
                params,
            })
        })
        .collect()
}
