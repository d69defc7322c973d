//! Shared modules and harness for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use modular_httpd::config::{ModuleEntry, ServerConfig};
use modular_httpd::http::{ChainResponse, Request, Response, Server};
use modular_httpd::lifecycle::Shutdown;
use modular_httpd::module::{
    ChainHandler, ConfigFormat, ConfigHandle, ConnectionWrapper, Handler, Logger, ModuleCatalog,
    ModuleError, ModuleResult, Sniffer,
};
use modular_httpd::observability::ConnectionLogger;
use modular_httpd::resolution::AcceptPattern;
use modular_httpd::session::SessionEnd;
use modular_httpd::stream::memory::{MemoryConnection, MemoryHandle};
use modular_httpd::stream::{BoxConnection, Connection, Input, Output, StreamError};
use serde::{Deserialize, Serialize};

/// Ordered record of events, shared between test modules and assertions.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|entry| entry.contains(needle))
    }
}

/// Answers every request with its own name as the body.
pub struct Named {
    name: String,
    journal: Journal,
}

impl Handler for Named {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        self.journal.push(format!("{} {}", self.name, request.path()));
        let mut response = ChainResponse::new(200);
        response.set_header("Content-Type", "text/plain");
        response.body = format!("{}:{}", self.name, request.path()).into_bytes();
        Ok(Some(response.into()))
    }
}

/// Records the visit and declines.
pub struct Declines {
    journal: Journal,
}

impl Handler for Declines {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        self.journal.push(format!("declined {}", request.path()));
        Ok(None)
    }
}

pub struct Fails;

impl Handler for Fails {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        Err(ModuleError::failed("backend unavailable"))
    }
}

pub struct Panics;

impl Handler for Panics {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        panic!("handler exploded");
    }
}

/// Blocks its worker thread well past any test handler timeout.
pub struct Stalls;

impl Handler for Stalls {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        std::thread::sleep(Duration::from_millis(500));
        Ok(Some(ChainResponse::new(200).into()))
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Counter {
    pub hits: u64,
}

/// Counts requests in its own configuration blob.
pub struct Counting {
    conf: ConfigHandle,
}

impl Handler for Counting {
    fn accept(&self) -> Vec<AcceptPattern> {
        vec![AcceptPattern::new("*/*", 1.0)]
    }

    fn handle(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        let mut counter: Counter = self.conf.read_json()?;
        counter.hits += 1;
        self.conf.write(ConfigFormat::Json, &serde_json::to_vec(&counter)?);
        let mut response = ChainResponse::new(200);
        response.body = counter.hits.to_string().into_bytes();
        Ok(Some(response.into()))
    }
}

/// Chain handler appending its name to the body, optionally setting a status.
pub struct Link {
    name: String,
    status: Option<u16>,
    journal: Journal,
}

impl ChainHandler for Link {
    fn handle(
        &self,
        _request: &Request,
        response: &mut ChainResponse,
        _logger: &ConnectionLogger,
    ) -> ModuleResult<()> {
        self.journal.push(self.name.clone());
        response.body.extend_from_slice(self.name.as_bytes());
        if let Some(status) = self.status {
            response.status = status;
        }
        Ok(())
    }
}

/// Records every notification as `"<event> <path>"`.
pub struct Recording {
    journal: Journal,
}

impl Sniffer for Recording {
    fn got_request(&self, request: &Request, _logger: &ConnectionLogger) -> ModuleResult<()> {
        self.journal.push(format!("request {}", request.path()));
        Ok(())
    }

    fn got_response(
        &self,
        request: &Request,
        response: &Response,
        _logger: &ConnectionLogger,
    ) -> ModuleResult<()> {
        self.journal.push(format!(
            "response {} {}",
            request.path(),
            response.status().unwrap_or_default()
        ));
        Ok(())
    }

    fn got_request_miss(&self, request: &Request, _logger: &ConnectionLogger) -> ModuleResult<()> {
        self.journal.push(format!("miss {}", request.path()));
        Ok(())
    }
}

/// Fails every notification.
pub struct BrokenSniffer;

impl Sniffer for BrokenSniffer {
    fn got_request(&self, _request: &Request, _logger: &ConnectionLogger) -> ModuleResult<()> {
        Err(ModuleError::failed("sniffer storage full"))
    }

    fn got_response(&self, _: &Request, _: &Response, _: &ConnectionLogger) -> ModuleResult<()> {
        panic!("sniffer exploded");
    }
}

pub struct JournalLogger {
    journal: Journal,
}

impl Logger for JournalLogger {
    fn log(&self, line: &str) {
        self.journal.push(line);
    }
}

pub struct RefusingWrapper;

impl ConnectionWrapper for RefusingWrapper {
    fn wrap(&self, _base: BoxConnection, _logger: &ConnectionLogger) -> ModuleResult<BoxConnection> {
        Err(ModuleError::failed("handshake rejected"))
    }
}

/// Wrapper whose connections pass traffic through and upper-case every write.
pub struct Tagging {
    journal: Journal,
}

impl ConnectionWrapper for Tagging {
    fn wrap(&self, base: BoxConnection, _logger: &ConnectionLogger) -> ModuleResult<BoxConnection> {
        Ok(Box::new(Tagged {
            base,
            journal: self.journal.clone(),
        }))
    }
}

pub struct Tagged {
    base: BoxConnection,
    journal: Journal,
}

impl Input for Tagged {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        let n = self.base.read(buf)?;
        if n > 0 {
            self.journal.push(format!("wrapped read {n}"));
        }
        Ok(n)
    }
}

impl Output for Tagged {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamError> {
        self.base.write(&buf.to_ascii_uppercase())
    }
}

impl Connection for Tagged {
    fn log(&self, line: &str) {
        self.base.log(line);
    }
}

impl Drop for Tagged {
    fn drop(&mut self) {
        // The base is still open here; it goes down with our fields.
        self.base.log("derived released");
        self.journal.push("derived released");
    }
}

/// Logger and sniffer that records when the server lets go of it.
pub struct Released {
    label: &'static str,
    journal: Journal,
}

impl Logger for Released {
    fn log(&self, _line: &str) {}
}

impl Sniffer for Released {}

impl Drop for Released {
    fn drop(&mut self) {
        self.journal.push(format!("{} released", self.label));
    }
}

/// Built-in modules plus the test modules above, all reporting to `journal`.
///
/// Handler identifiers `h1`..`h4` answer with their own name.
pub fn catalog(journal: &Journal) -> ModuleCatalog {
    let mut catalog = ModuleCatalog::builtin();
    for name in ["h1", "h2", "h3", "h4"] {
        let journal = journal.clone();
        catalog.register_handler(name, move |_conf| {
            Ok(Arc::new(Named {
                name: name.to_string(),
                journal: journal.clone(),
            }))
        });
    }
    let declines = journal.clone();
    let sniffer = journal.clone();
    let logger = journal.clone();
    let tagging = journal.clone();
    let released_logger = journal.clone();
    let released_sniffer = journal.clone();
    catalog
        .register_handler("declines", move |_conf| {
            Ok(Arc::new(Declines {
                journal: declines.clone(),
            }))
        })
        .register_handler("fails", |_conf| Ok(Arc::new(Fails)))
        .register_handler("panics", |_conf| Ok(Arc::new(Panics)))
        .register_handler("stalls", |_conf| Ok(Arc::new(Stalls)))
        .register_handler("counting", |conf| Ok(Arc::new(Counting { conf })))
        .register_sniffer("recording", move |_conf| {
            Ok(Arc::new(Recording {
                journal: sniffer.clone(),
            }))
        })
        .register_sniffer("broken", |_conf| Ok(Arc::new(BrokenSniffer)))
        .register_logger("journal", move |_conf| {
            Ok(Arc::new(JournalLogger {
                journal: logger.clone(),
            }))
        })
        .register_wrapper("refusing", |_conf| Ok(Arc::new(RefusingWrapper)))
        .register_wrapper("tagging", move |_conf| {
            Ok(Arc::new(Tagging {
                journal: tagging.clone(),
            }))
        })
        .register_logger("released", move |_conf| {
            Ok(Arc::new(Released {
                label: "logger",
                journal: released_logger.clone(),
            }))
        })
        .register_sniffer("released", move |_conf| {
            Ok(Arc::new(Released {
                label: "sniffer",
                journal: released_sniffer.clone(),
            }))
        });

    for (name, status) in [("c1", None), ("c2", Some(404)), ("c3", None)] {
        let journal = journal.clone();
        catalog.register_chain_handler(name, move |_conf| {
            Ok(Arc::new(Link {
                name: name.to_string(),
                status,
                journal: journal.clone(),
            }))
        });
    }
    catalog
}

/// `http1` parser, the given handlers, and timings tight enough for tests.
pub fn config(handlers: &[&str]) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.modules.parser = Some(ModuleEntry::new("http1"));
    config.modules.handlers = handlers.iter().map(|name| ModuleEntry::new(*name)).collect();
    config.timeouts.handler_ms = 100;
    config.timeouts.write_ms = 200;
    config.timeouts.idle_secs = 5;
    config.timeouts.drain_secs = 1;
    config.polling.max_interval_ms = 5;
    config
}

/// Feed `input` to a fresh in-memory connection and serve it to completion.
///
/// The client side is closed after `input`, so a session that would
/// otherwise keep polling ends with `PeerClosed`.
pub async fn exchange(server: &Server, input: &[u8]) -> (SessionEnd, MemoryHandle) {
    let (conn, handle) = MemoryConnection::new();
    handle.feed(input);
    handle.close_input();
    let end = serve(server, conn).await;
    (end, handle)
}

/// Serve an already-prepared connection.
pub async fn serve(server: &Server, conn: MemoryConnection) -> SessionEnd {
    let shutdown = Shutdown::new();
    tokio::time::timeout(
        Duration::from_secs(10),
        server.serve_connection(Box::new(conn), shutdown.subscribe()),
    )
    .await
    .expect("session did not finish")
}

/// Split raw server output into individual responses.
pub fn responses(output: &str) -> Vec<(u16, String)> {
    let mut found = Vec::new();
    let mut rest = output;
    while let Some(head_end) = rest.find("\r\n\r\n") {
        let head = &rest[..head_end];
        let status = head
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_default();
        let length: usize = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())
                    .flatten()
            })
            .unwrap_or(0);
        let body_start = head_end + 4;
        found.push((status, rest[body_start..body_start + length].to_string()));
        rest = &rest[body_start + length..];
    }
    found
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Run `future` with a deadline, failing the test if it overruns.
pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation exceeded its deadline")
}
