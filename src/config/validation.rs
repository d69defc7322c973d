//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, connection limit > 0)
//! - Check module slots (parser present, identifiers set, accept lists sane)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ModuleEntry, ServerConfig};
use crate::resolution::matcher::MediaPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("modules.parser is required")]
    MissingParser,

    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("polling.min_interval_ms ({min}) exceeds polling.max_interval_ms ({max})")]
    PollingRange { min: u64, max: u64 },

    #[error("{slot}: module identifier is empty")]
    EmptyModule { slot: String },

    #[error("{slot}: accept weight {weight} is not finite")]
    NonFiniteWeight { slot: String, weight: f64 },

    #[error("{slot}: accept pattern '{pattern}' is not of the form type/subtype")]
    InvalidPattern { slot: String, pattern: String },
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::NotPositive {
            field: "listener.max_connections",
        });
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.handler_ms", timeouts.handler_ms),
        ("timeouts.write_ms", timeouts.write_ms),
        ("timeouts.idle_secs", timeouts.idle_secs),
        ("timeouts.drain_secs", timeouts.drain_secs),
        ("polling.min_interval_ms", config.polling.min_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }
    if config.polling.min_interval_ms > config.polling.max_interval_ms {
        errors.push(ValidationError::PollingRange {
            min: config.polling.min_interval_ms,
            max: config.polling.max_interval_ms,
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let modules = &config.modules;
    if modules.parser.is_none() {
        errors.push(ValidationError::MissingParser);
    }
    let slots = modules
        .loggers
        .iter()
        .enumerate()
        .map(|(i, entry)| (format!("modules.loggers[{i}]"), entry))
        .chain(modules.wrapper.iter().map(|entry| ("modules.wrapper".to_string(), entry)))
        .chain(modules.parser.iter().map(|entry| ("modules.parser".to_string(), entry)))
        .chain(
            modules
                .handlers
                .iter()
                .enumerate()
                .map(|(i, entry)| (format!("modules.handlers[{i}]"), entry)),
        )
        .chain(
            modules
                .sniffers
                .iter()
                .enumerate()
                .map(|(i, entry)| (format!("modules.sniffers[{i}]"), entry)),
        );
    for (slot, entry) in slots {
        validate_entry(&slot, entry, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_entry(slot: &str, entry: &ModuleEntry, errors: &mut Vec<ValidationError>) {
    if entry.module.trim().is_empty() {
        errors.push(ValidationError::EmptyModule {
            slot: slot.to_string(),
        });
    }
    for accept in entry.accept.iter().flatten() {
        if !accept.weight.is_finite() {
            errors.push(ValidationError::NonFiniteWeight {
                slot: slot.to_string(),
                weight: accept.weight,
            });
        }
        if MediaPattern::parse(&accept.pattern).is_none() {
            errors.push(ValidationError::InvalidPattern {
                slot: slot.to_string(),
                pattern: accept.pattern.clone(),
            });
        }
    }
}
