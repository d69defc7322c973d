//! Logger modules: bridge to `tracing`, append to a file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;

use crate::module::{ConfigHandle, Logger, ModuleError, ModuleResult};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TracingSettings {
    level: Option<String>,
}

/// Forwards module log lines into the process log.
#[derive(Debug)]
pub struct TracingLogger {
    level: tracing::Level,
}

impl TracingLogger {
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }

    pub fn from_config(conf: &ConfigHandle) -> ModuleResult<Self> {
        let settings: TracingSettings = conf.read_json()?;
        let level = match settings.level.as_deref() {
            None => tracing::Level::INFO,
            Some(text) => text
                .parse()
                .map_err(|_| ModuleError::Config(format!("unknown log level '{text}'")))?,
        };
        Ok(Self::new(level))
    }
}

impl Logger for TracingLogger {
    fn log(&self, line: &str) {
        // Event levels must be constants, hence the match.
        match self.level {
            tracing::Level::TRACE => tracing::trace!(target: "module", "{line}"),
            tracing::Level::DEBUG => tracing::debug!(target: "module", "{line}"),
            tracing::Level::INFO => tracing::info!(target: "module", "{line}"),
            tracing::Level::WARN => tracing::warn!(target: "module", "{line}"),
            tracing::Level::ERROR => tracing::error!(target: "module", "{line}"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    path: Option<PathBuf>,
}

/// Appends module log lines to a file, one per line.
#[derive(Debug)]
pub struct FileLogger {
    file: Mutex<File>,
}

impl FileLogger {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    pub fn from_config(conf: &ConfigHandle) -> ModuleResult<Self> {
        let settings: FileSettings = conf.read_json()?;
        let path = settings
            .path
            .ok_or_else(|| ModuleError::Config("file logger needs a 'path'".into()))?;
        Ok(Self::open(&path)?)
    }
}

impl Logger for FileLogger {
    fn log(&self, line: &str) {
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(file, "{line}") {
            tracing::warn!(error = %err, "File logger write failed");
        }
    }
}
