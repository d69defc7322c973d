//! Minimal HTTP/1.x request parser.
//!
//! # Responsibilities
//! - Buffer bytes until a full head (`\r\n\r\n`) and any `Content-Length`
//!   body are available
//! - Emit one [`Request`] per message, in arrival order, several per call
//!   when the client pipelines
//!
//! # Design Decisions
//! - Chunked request bodies are rejected as malformed
//! - The head is bounded by `max_head_bytes` and the body by `max_body_bytes`,
//!   checked against `Content-Length` before any body byte is buffered

use serde::Deserialize;

use crate::http::{Method, Request};
use crate::module::{
    ConfigHandle, ModuleResult, ParseError, Parser, ParserInstance, RequestSink,
};
use crate::observability::logging::ConnectionLogger;
use crate::stream::{Input, StreamError};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Http1Settings {
    max_head_bytes: usize,
    max_body_bytes: usize,
}

impl Default for Http1Settings {
    fn default() -> Self {
        Self {
            max_head_bytes: 8192,
            max_body_bytes: 1 << 20,
        }
    }
}

/// Parser module creating one [`Http1Instance`] per connection.
#[derive(Debug, Clone)]
pub struct Http1Parser {
    max_head_bytes: usize,
    max_body_bytes: usize,
}

impl Http1Parser {
    pub fn new(max_head_bytes: usize) -> Self {
        Self {
            max_head_bytes,
            max_body_bytes: Http1Settings::default().max_body_bytes,
        }
    }

    /// Cap on a single request body, as announced by `Content-Length`.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn from_config(conf: &ConfigHandle) -> ModuleResult<Self> {
        let settings: Http1Settings = conf.read_json()?;
        Ok(Self::new(settings.max_head_bytes).with_max_body_bytes(settings.max_body_bytes))
    }
}

impl Default for Http1Parser {
    fn default() -> Self {
        Self::new(Http1Settings::default().max_head_bytes)
    }
}

impl Parser for Http1Parser {
    fn create(&self, logger: ConnectionLogger, sink: RequestSink) -> ModuleResult<Box<dyn ParserInstance>> {
        Ok(Box::new(Http1Instance {
            buffer: Vec::new(),
            max_head_bytes: self.max_head_bytes,
            max_body_bytes: self.max_body_bytes,
            logger,
            sink,
        }))
    }
}

/// Parsing state of one connection.
pub struct Http1Instance {
    buffer: Vec<u8>,
    max_head_bytes: usize,
    max_body_bytes: usize,
    logger: ConnectionLogger,
    sink: RequestSink,
}

impl ParserInstance for Http1Instance {
    fn parse(&mut self, input: &mut dyn Input) -> Result<(), ParseError> {
        let mut closed = false;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match input.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(StreamError::Closed) => {
                    closed = true;
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        while let Some(request) = self.next_request()? {
            self.sink.emit(request);
        }

        if closed {
            if !self.buffer.is_empty() {
                self.logger.log(&format!(
                    "connection closed with {} bytes of an incomplete request",
                    self.buffer.len()
                ));
            }
            return Err(StreamError::Closed.into());
        }
        Ok(())
    }
}

impl Http1Instance {
    /// Take one complete message off the front of the buffer.
    fn next_request(&mut self) -> Result<Option<Request>, ParseError> {
        // Tolerate blank lines between pipelined messages.
        let leading = self
            .buffer
            .iter()
            .take_while(|b| **b == b'\r' || **b == b'\n')
            .count();
        self.buffer.drain(..leading);

        let Some(head_end) = find(&self.buffer, b"\r\n\r\n") else {
            if self.buffer.len() > self.max_head_bytes {
                return Err(ParseError::TooLarge {
                    limit: self.max_head_bytes,
                });
            }
            return Ok(None);
        };
        if head_end > self.max_head_bytes {
            return Err(ParseError::TooLarge {
                limit: self.max_head_bytes,
            });
        }

        let head = std::str::from_utf8(&self.buffer[..head_end])
            .map_err(|_| ParseError::Malformed("request head is not UTF-8".into()))?;
        let lines: Vec<String> = head.split("\r\n").map(str::to_string).collect();

        let request_line = &lines[0];
        let mut parts = request_line.split(' ').filter(|p| !p.is_empty());
        let (Some(method), Some(target), Some(protocol), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::Malformed(format!("bad request line '{request_line}'")));
        };
        let method: Method = method
            .parse()
            .map_err(|err: crate::http::request::UnknownMethod| ParseError::Malformed(err.to_string()))?;
        if !protocol.starts_with("HTTP/1.") {
            return Err(ParseError::Malformed(format!("unsupported protocol '{protocol}'")));
        }

        let mut builder = Request::builder(method, target).protocol(protocol);
        let mut content_length = 0usize;
        for line in &lines[1..] {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ParseError::Malformed(format!("bad header line '{line}'")))?;
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                return Err(ParseError::Malformed("empty header name".into()));
            }
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value
                    .parse()
                    .map_err(|_| ParseError::Malformed(format!("bad Content-Length '{value}'")))?;
            }
            if name.eq_ignore_ascii_case("transfer-encoding") && !value.eq_ignore_ascii_case("identity") {
                return Err(ParseError::Malformed(format!("unsupported Transfer-Encoding '{value}'")));
            }
            builder = builder.header(name, value);
        }

        if content_length > self.max_body_bytes {
            return Err(ParseError::TooLarge {
                limit: self.max_body_bytes,
            });
        }
        let body_start = head_end + 4;
        let message_end = body_start
            .checked_add(content_length)
            .ok_or_else(|| ParseError::Malformed(format!("Content-Length {content_length} out of range")))?;
        if self.buffer.len() < message_end {
            return Ok(None);
        }

        let data: Vec<u8> = self.buffer.drain(..message_end).collect();
        if content_length > 0 {
            builder = builder.body(data[body_start..].to_vec());
        }
        Ok(Some(builder.lines(lines).data(data).build()))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::LogFanout;
    use crate::stream::memory::MemoryConnection;
    use crate::stream::InputView;
    use std::sync::Arc;

    fn instance(max_head_bytes: usize) -> (Box<dyn ParserInstance>, tokio::sync::mpsc::UnboundedReceiver<Request>) {
        with_parser(Http1Parser::new(max_head_bytes))
    }

    fn with_parser(parser: Http1Parser) -> (Box<dyn ParserInstance>, tokio::sync::mpsc::UnboundedReceiver<Request>) {
        let (sink, rx) = RequestSink::channel();
        let logger = ConnectionLogger::process(Arc::new(LogFanout::new()));
        (parser.create(logger, sink).unwrap(), rx)
    }

    #[test]
    fn emits_pipelined_requests_in_order() {
        let (mut parser, mut rx) = instance(8192);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nPOST /b?k=v HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /c HTTP/1.1\r\n");

        parser.parse(&mut InputView::new(&mut conn)).unwrap();
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(rx.try_recv().is_err());

        assert_eq!(first.path(), "/a");
        assert_eq!(first.host(), "x");
        assert_eq!(second.method(), Method::Post);
        assert_eq!(second.body(), Some(&b"abc"[..]));
        assert_eq!(second.arguments().get("k").map(String::as_str), Some("v"));

        handle.feed(b"\r\n");
        parser.parse(&mut InputView::new(&mut conn)).unwrap();
        assert_eq!(rx.try_recv().unwrap().path(), "/c");
    }

    #[test]
    fn waits_for_the_whole_body() {
        let (mut parser, mut rx) = instance(8192);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"PUT / HTTP/1.1\r\nContent-Length: 4\r\n\r\nab");
        parser.parse(&mut InputView::new(&mut conn)).unwrap();
        assert!(rx.try_recv().is_err());

        handle.feed(b"cd");
        parser.parse(&mut InputView::new(&mut conn)).unwrap();
        assert_eq!(rx.try_recv().unwrap().body(), Some(&b"abcd"[..]));
    }

    #[test]
    fn rejects_garbage_and_oversized_heads() {
        let (mut parser, _rx) = instance(8192);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"NOT A REQUEST AT ALL\r\n\r\n");
        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::Malformed(_))
        ));

        let (mut parser, _rx) = instance(16);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"GET /a-very-long-path-indeed HTTP/1.1\r\n");
        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::TooLarge { limit: 16 })
        ));
    }

    #[test]
    fn rejects_content_length_past_the_address_space() {
        // Must not overflow when added to the head offset.
        let (mut parser, mut rx) = with_parser(Http1Parser::new(8192).with_max_body_bytes(usize::MAX));
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\nx", usize::MAX).as_bytes());
        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::Malformed(_))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rejects_bodies_over_the_limit_before_buffering() {
        let (mut parser, mut rx) = with_parser(Http1Parser::new(8192).with_max_body_bytes(8));
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nx");
        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::TooLarge { limit: 8 })
        ));

        let (mut parser, _rx) = with_parser(Http1Parser::new(8192).with_max_body_bytes(8));
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"POST / HTTP/1.1\r\nContent-Length: 9\r\n\r\n");
        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::TooLarge { limit: 8 })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_stream_still_flushes_complete_requests() {
        let (mut parser, mut rx) = instance(8192);
        let (mut conn, handle) = MemoryConnection::new();
        handle.feed(b"GET /last HTTP/1.0\r\n\r\n");
        handle.close_input();

        assert!(matches!(
            parser.parse(&mut InputView::new(&mut conn)),
            Err(ParseError::Stream(StreamError::Closed))
        ));
        let request = rx.try_recv().unwrap();
        assert_eq!(request.path(), "/last");
        assert!(request.close_connection());
    }
}
