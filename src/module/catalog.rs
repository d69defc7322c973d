//! Named module constructors.
//!
//! # Responsibilities
//! - Map a configured module identifier to a constructor, per module kind
//! - Hand each new instance its own pre-loaded ConfigHandle
//!
//! # Design Decisions
//! - Constructors are plain closures registered at startup; no dynamic
//!   library loading
//! - Separate tables per kind: the same identifier may name a handler and a
//!   chain handler without ambiguity

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::{
    ChainHandler, ConfigHandle, ConnectionWrapper, Handler, Logger, ModuleResult, Parser, Sniffer,
};

/// A constructor for one module kind.
pub(crate) type Factory<T> = Box<dyn Fn(ConfigHandle) -> ModuleResult<Arc<T>> + Send + Sync>;

/// Table of module constructors, looked up by identifier.
#[derive(Default)]
pub struct ModuleCatalog {
    pub(crate) loggers: HashMap<String, Factory<dyn Logger>>,
    pub(crate) wrappers: HashMap<String, Factory<dyn ConnectionWrapper>>,
    pub(crate) parsers: HashMap<String, Factory<dyn Parser>>,
    pub(crate) handlers: HashMap<String, Factory<dyn Handler>>,
    pub(crate) chain_handlers: HashMap<String, Factory<dyn ChainHandler>>,
    pub(crate) sniffers: HashMap<String, Factory<dyn Sniffer>>,
}

impl ModuleCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every module shipped with the server.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        crate::builtin::register_all(&mut catalog);
        catalog
    }

    pub fn register_logger<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Logger + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.loggers
            .insert(name.into(), Box::new(move |conf| Ok(factory(conf)? as Arc<dyn Logger>)));
        self
    }

    pub fn register_wrapper<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: ConnectionWrapper + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.wrappers.insert(
            name.into(),
            Box::new(move |conf| Ok(factory(conf)? as Arc<dyn ConnectionWrapper>)),
        );
        self
    }

    pub fn register_parser<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Parser + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.parsers
            .insert(name.into(), Box::new(move |conf| Ok(factory(conf)? as Arc<dyn Parser>)));
        self
    }

    pub fn register_handler<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Handler + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.handlers
            .insert(name.into(), Box::new(move |conf| Ok(factory(conf)? as Arc<dyn Handler>)));
        self
    }

    pub fn register_chain_handler<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: ChainHandler + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.chain_handlers.insert(
            name.into(),
            Box::new(move |conf| Ok(factory(conf)? as Arc<dyn ChainHandler>)),
        );
        self
    }

    pub fn register_sniffer<M, F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        M: Sniffer + 'static,
        F: Fn(ConfigHandle) -> ModuleResult<Arc<M>> + Send + Sync + 'static,
    {
        self.sniffers
            .insert(name.into(), Box::new(move |conf| Ok(factory(conf)? as Arc<dyn Sniffer>)));
        self
    }

    /// Registered identifiers per kind, sorted; used by `--check` output.
    pub fn describe(&self) -> Vec<(&'static str, Vec<&str>)> {
        fn names<T: ?Sized>(table: &HashMap<String, Factory<T>>) -> Vec<&str> {
            let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        }
        vec![
            ("logger", names(&self.loggers)),
            ("wrapper", names(&self.wrappers)),
            ("parser", names(&self.parsers)),
            ("handler", names(&self.handlers)),
            ("chain_handler", names(&self.chain_handlers)),
            ("sniffer", names(&self.sniffers)),
        ]
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl Logger for Quiet {
        fn log(&self, _line: &str) {}
    }

    #[test]
    fn registered_constructor_is_listed() {
        let mut catalog = ModuleCatalog::new();
        catalog.register_logger("quiet", |_conf| Ok(Arc::new(Quiet)));

        let described = catalog.describe();
        assert_eq!(described[0], ("logger", vec!["quiet"]));
        assert!(described[1].1.is_empty());
    }

    #[test]
    fn builtin_catalog_has_http1_parser() {
        let catalog = ModuleCatalog::builtin();
        assert!(catalog.parsers.contains_key("http1"));
        assert!(catalog.handlers.contains_key("static"));
        assert!(catalog.chain_handlers.contains_key("headers"));
        assert!(catalog.sniffers.contains_key("access_log"));
        assert!(catalog.loggers.contains_key("tracing"));
        assert!(catalog.loggers.contains_key("file"));
    }
}
