//! Structured logging and module log fan-out.
//!
//! # Responsibilities
//! - Initialize the process `tracing` subscriber
//! - Deliver module log lines to every configured logger module
//! - Hand each connection a cheap, cloneable logger bound to its id
//!
//! # Design Decisions
//! - Process logs (tracing) and module logs (Logger fan-out) are separate
//!   streams; the built-in `tracing` logger module bridges the second into the first
//! - `RUST_LOG` overrides the configured level

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::module::Logger;
use crate::net::connection::ConnectionId;
use crate::observability::fanout::Fanout;

/// Initialize the global tracing subscriber.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("modular_httpd={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Delivers log lines to every registered logger module.
pub struct LogFanout {
    lanes: Fanout<Arc<str>>,
}

impl LogFanout {
    pub fn new() -> Self {
        Self {
            lanes: Fanout::new("logger"),
        }
    }

    /// Add a logger module. Lines logged afterwards reach it in order.
    pub fn register(&self, name: &str, logger: Arc<dyn Logger>) -> std::io::Result<()> {
        self.lanes.add_lane(name, move |line: Arc<str>| logger.log(&line))
    }

    pub fn log(&self, line: &str) {
        self.lanes.publish(Arc::from(line));
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn close(&self, grace: Duration) {
        self.lanes.close(grace);
    }
}

impl Default for LogFanout {
    fn default() -> Self {
        Self::new()
    }
}

/// Logger handed to parsers, handlers and sniffers for one connection.
///
/// Every line goes to all logger modules and is traced at debug level with
/// the connection id.
#[derive(Clone)]
pub struct ConnectionLogger {
    connection_id: Option<ConnectionId>,
    fanout: Arc<LogFanout>,
}

impl ConnectionLogger {
    pub fn new(connection_id: ConnectionId, fanout: Arc<LogFanout>) -> Self {
        Self {
            connection_id: Some(connection_id),
            fanout,
        }
    }

    /// Logger for lines not tied to a client connection (startup, teardown).
    pub fn process(fanout: Arc<LogFanout>) -> Self {
        Self {
            connection_id: None,
            fanout,
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn log(&self, line: &str) {
        match self.connection_id {
            Some(id) => tracing::debug!(connection_id = %id, line, "Module log"),
            None => tracing::debug!(line, "Module log"),
        }
        self.fanout.log(line);
    }
}

impl std::fmt::Debug for ConnectionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLogger")
            .field("connection_id", &self.connection_id)
            .field("loggers", &self.fanout.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<String>>);

    impl Logger for Recorder {
        fn log(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    struct Exploding;

    impl Logger for Exploding {
        fn log(&self, _line: &str) {
            panic!("logger exploded");
        }
    }

    #[test]
    fn failing_logger_does_not_block_the_others() {
        let fanout = Arc::new(LogFanout::new());
        let first = Arc::new(Recorder(Mutex::new(Vec::new())));
        let last = Arc::new(Recorder(Mutex::new(Vec::new())));
        fanout.register("first", first.clone()).unwrap();
        fanout.register("exploding", Arc::new(Exploding)).unwrap();
        fanout.register("last", last.clone()).unwrap();

        let logger = ConnectionLogger::new(ConnectionId::new(), Arc::clone(&fanout));
        logger.log("one");
        logger.log("two");
        fanout.close(Duration::from_secs(2));

        assert_eq!(*first.0.lock().unwrap(), vec!["one", "two"]);
        assert_eq!(*last.0.lock().unwrap(), vec!["one", "two"]);
    }
}
