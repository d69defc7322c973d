//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → modules section handed to the ModuleRegistry
//!
//! On write-back:
//!     ModuleRegistry::snapshot()
//!     → ServerConfig::with_module_snapshot (JSON blobs inlined as tables)
//!     → to_toml_string / save_config
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, save_config, ConfigError};
pub use schema::{
    ListenerConfig, ModuleEntry, ModulesConfig, ResolutionPolicy, ServerConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
