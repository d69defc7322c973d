//! Configuration loading from disk and write-back.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ModuleEntry, ServerConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::module::{ModuleKind, ModuleSnapshot};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Write a configuration document to disk.
pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    fs::write(path, config.to_toml_string()?)?;
    Ok(())
}

impl ServerConfig {
    /// Render the configuration as a TOML document.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy of this configuration with module blobs replaced by what the
    /// live modules currently hold.
    pub fn with_module_snapshot(&self, snapshot: &[ModuleSnapshot]) -> Self {
        let mut updated = self.clone();
        for entry in snapshot {
            let modules = &mut updated.modules;
            let slot: Option<&mut ModuleEntry> = match entry.kind {
                ModuleKind::Logger => modules.loggers.get_mut(entry.slot),
                ModuleKind::Wrapper => modules.wrapper.as_mut(),
                ModuleKind::Parser => modules.parser.as_mut(),
                ModuleKind::Handler | ModuleKind::ChainHandler => {
                    modules.handlers.get_mut(entry.slot)
                }
                ModuleKind::Sniffer => modules.sniffers.get_mut(entry.slot),
            };
            let Some(slot) = slot.filter(|slot| slot.module == entry.module) else {
                tracing::warn!(kind = %entry.kind, module = %entry.module, slot = entry.slot, "Snapshot entry has no matching configuration slot");
                continue;
            };
            if !slot.store_blob(entry.format, &entry.data) {
                tracing::debug!(kind = %entry.kind, module = %entry.module, "Binary module configuration left out of the document");
            }
        }
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ConfigFormat;

    #[test]
    fn parse_rejects_missing_parser() {
        let err = parse_config("[listener]\nmax_connections = 4\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.contains(&ValidationError::MissingParser)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(
            &path,
            "[resolution]\npolicy = \"ordered_chain\"\n[modules.parser]\nmodule = \"http1\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            config.resolution.policy,
            crate::config::schema::ResolutionPolicy::OrderedChain
        );
    }

    #[test]
    fn snapshot_write_back_round_trips_through_toml() {
        let config = ServerConfig::builtin();
        let snapshot = vec![ModuleSnapshot {
            kind: ModuleKind::Handler,
            slot: 0,
            module: "static".into(),
            format: ConfigFormat::Json,
            data: br#"{"body":"updated","status":202}"#.to_vec(),
        }];

        let updated = config.with_module_snapshot(&snapshot);
        let text = updated.to_toml_string().unwrap();
        let reparsed = parse_config(&text).unwrap();

        let handle = reparsed.modules.handlers[0].config_handle().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&handle.read()).unwrap();
        assert_eq!(json["body"], "updated");
        assert_eq!(json["status"], 202);
    }

    #[test]
    fn snapshot_for_other_module_is_ignored() {
        let config = ServerConfig::builtin();
        let snapshot = vec![ModuleSnapshot {
            kind: ModuleKind::Handler,
            slot: 0,
            module: "something-else".into(),
            format: ConfigFormat::Json,
            data: b"{}".to_vec(),
        }];
        assert_eq!(config.with_module_snapshot(&snapshot), config);
    }
}
