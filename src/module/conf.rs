//! Per-module configuration handles.
//!
//! # Responsibilities
//! - Store one module instance's configuration as raw bytes
//! - Remember the format hint of the last write
//! - Let the registry read the current contents back for write-out
//!
//! # Design Decisions
//! - Not `Clone`: exactly one handle per instance, never shared across modules
//! - A never-written handle reads as empty with an `Undefined` format

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Format hint attached to a configuration write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    /// Opaque binary data; kept out of the main document.
    #[default]
    Undefined,
    /// Preferred; inlined into the server configuration.
    Json,
    Xml,
    Ini,
}

#[derive(Debug, Default)]
struct Stored {
    format: ConfigFormat,
    data: Vec<u8>,
}

/// Isolated configuration store for a single module instance.
#[derive(Debug, Default)]
pub struct ConfigHandle {
    stored: Arc<RwLock<Stored>>,
}

impl ConfigHandle {
    /// An empty, never-written handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle pre-loaded with a configuration blob.
    pub fn preloaded(format: ConfigFormat, data: Vec<u8>) -> Self {
        Self {
            stored: Arc::new(RwLock::new(Stored { format, data })),
        }
    }

    /// The bytes last written, or empty if never written.
    pub fn read(&self) -> Vec<u8> {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .clone()
    }

    /// Overwrite the configuration.
    pub fn write(&self, format: ConfigFormat, data: &[u8]) {
        let mut stored = self.stored.write().unwrap_or_else(PoisonError::into_inner);
        stored.format = format;
        stored.data = data.to_vec();
    }

    /// Format hint of the current contents.
    pub fn format(&self) -> ConfigFormat {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .format
    }

    /// Deserialize JSON contents; an empty handle yields `T::default()`.
    pub fn read_json<T>(&self) -> serde_json::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let data = self.read();
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&data)
    }

    /// Registry-side view of the same store, used to export the contents.
    pub(crate) fn observer(&self) -> ConfigHandle {
        Self {
            stored: Arc::clone(&self.stored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_written_reads_empty() {
        let handle = ConfigHandle::new();
        assert!(handle.read().is_empty());
        assert_eq!(handle.format(), ConfigFormat::Undefined);
    }

    #[test]
    fn write_then_read_returns_last_write() {
        let handle = ConfigHandle::new();
        handle.write(ConfigFormat::Ini, b"a=1");
        handle.write(ConfigFormat::Json, br#"{"a":2}"#);
        assert_eq!(handle.read(), br#"{"a":2}"#);
        assert_eq!(handle.format(), ConfigFormat::Json);
    }

    #[test]
    fn observer_sees_module_writes() {
        let handle = ConfigHandle::preloaded(ConfigFormat::Json, b"{}".to_vec());
        let observer = handle.observer();
        handle.write(ConfigFormat::Xml, b"<a/>");
        assert_eq!(observer.read(), b"<a/>");
        assert_eq!(observer.format(), ConfigFormat::Xml);
    }

    #[test]
    fn json_helper_defaults_on_empty() {
        #[derive(Debug, Default, serde::Deserialize, PartialEq)]
        struct Settings {
            level: Option<String>,
        }
        let empty = ConfigHandle::new();
        assert_eq!(empty.read_json::<Settings>().unwrap(), Settings::default());

        let set = ConfigHandle::preloaded(ConfigFormat::Json, br#"{"level":"warn"}"#.to_vec());
        assert_eq!(set.read_json::<Settings>().unwrap().level.as_deref(), Some("warn"));
    }
}
