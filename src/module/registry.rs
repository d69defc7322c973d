//! Live module instances for one server.
//!
//! # Responsibilities
//! - Instantiate configured modules through the catalog, in the order
//!   loggers → wrapper → parser → handlers → sniffers
//! - Keep one ConfigHandle per instance and export their contents
//! - Tear everything down in reverse order
//!
//! # Data Flow
//! ```text
//! ServerConfig.modules ─┬─ loggers  → LogFanout lanes
//!                       ├─ wrapper  → Option<Arc<dyn ConnectionWrapper>>
//!                       ├─ parser   → Arc<dyn Parser>            (required)
//!                       ├─ handlers → ResolutionEngine (policy from config)
//!                       └─ sniffers → SnifferFanout lanes
//! ```
//!
//! # Design Decisions
//! - A parser that cannot be built is fatal; any other failed slot is
//!   reported and omitted
//! - Fields are declared in teardown order, so even an implicit drop
//!   releases sniffers and handlers before the parser, wrapper and loggers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ModuleEntry, ResolutionPolicy, ServerConfig};
use crate::module::catalog::Factory;
use crate::module::{
    ConfigFormat, ConfigHandle, ConnectionWrapper, ModuleCatalog, ModuleError, ModuleKind, Parser,
};
use crate::net::connection::ConnectionId;
use crate::observability::logging::{ConnectionLogger, LogFanout};
use crate::observability::sniffing::SnifferFanout;
use crate::resilience::isolation::run_isolated;
use crate::resolution::{ChainLink, HandlerDescriptor, OrderedChain, PriorityMatch, ResolutionEngine};

/// Error raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no {kind} module named '{module}' in the catalog")]
    UnknownModule { kind: ModuleKind, module: String },

    #[error("{kind} module '{module}': configuration is not representable as JSON: {source}")]
    Config {
        kind: ModuleKind,
        module: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} module '{module}' failed to initialize: {source}")]
    Construction {
        kind: ModuleKind,
        module: String,
        #[source]
        source: ModuleError,
    },

    #[error("handler '{module}': accept pattern '{pattern}' with weight {weight} is invalid")]
    InvalidAccept {
        module: String,
        pattern: String,
        weight: f64,
    },

    #[error("could not start delivery lane for {kind} module '{module}': {source}")]
    Lane {
        kind: ModuleKind,
        module: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no parser configured")]
    MissingParser,
}

/// One module's configuration as currently held by its handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSnapshot {
    pub kind: ModuleKind,
    /// Position of the entry within its configuration list.
    pub slot: usize,
    pub module: String,
    pub format: ConfigFormat,
    pub data: Vec<u8>,
}

struct Slot {
    kind: ModuleKind,
    index: usize,
    module: String,
    conf: ConfigHandle,
}

/// Every live module of a server.
pub struct ModuleRegistry {
    sniffers: SnifferFanout,
    engine: ResolutionEngine,
    parser: Arc<dyn Parser>,
    wrapper: Option<Arc<dyn ConnectionWrapper>>,
    log_fanout: Arc<LogFanout>,
    slots: Vec<Slot>,
    omitted: Vec<RegistryError>,
    close_grace: Duration,
}

impl ModuleRegistry {
    /// Build every configured module.
    pub fn load(config: &ServerConfig, catalog: &ModuleCatalog) -> Result<Self, RegistryError> {
        let modules = &config.modules;
        let mut slots = Vec::new();
        let mut omitted = Vec::new();

        let log_fanout = Arc::new(LogFanout::new());
        let process_logger = ConnectionLogger::process(Arc::clone(&log_fanout));

        for (index, entry) in modules.loggers.iter().enumerate() {
            let loaded = instantiate(&catalog.loggers, ModuleKind::Logger, index, entry).and_then(
                |(logger, slot)| {
                    log_fanout
                        .register(&entry.module, logger)
                        .map_err(|source| RegistryError::Lane {
                            kind: ModuleKind::Logger,
                            module: entry.module.clone(),
                            source,
                        })
                        .map(|()| slot)
                },
            );
            match loaded {
                Ok(slot) => slots.push(slot),
                Err(err) => omit(&process_logger, &mut omitted, err),
            }
        }

        let wrapper = match &modules.wrapper {
            Some(entry) => match instantiate(&catalog.wrappers, ModuleKind::Wrapper, 0, entry) {
                Ok((wrapper, slot)) => {
                    slots.push(slot);
                    Some(wrapper)
                }
                Err(err) => {
                    omit(&process_logger, &mut omitted, err);
                    None
                }
            },
            None => None,
        };

        let parser_entry = modules.parser.as_ref().ok_or(RegistryError::MissingParser)?;
        let (parser, slot) = instantiate(&catalog.parsers, ModuleKind::Parser, 0, parser_entry)?;
        slots.push(slot);

        let timeout = config.timeouts.handler();
        let engine = match config.resolution.policy {
            ResolutionPolicy::Priority => {
                let mut descriptors = Vec::new();
                for (index, entry) in modules.handlers.iter().enumerate() {
                    let loaded = instantiate(&catalog.handlers, ModuleKind::Handler, index, entry)
                        .and_then(|(handler, slot)| {
                            HandlerDescriptor::new(
                                entry.module.clone(),
                                index,
                                handler,
                                entry.accept.as_deref(),
                            )
                            .map(|descriptor| (descriptor, slot))
                            .map_err(|bad| RegistryError::InvalidAccept {
                                module: entry.module.clone(),
                                pattern: bad.pattern,
                                weight: bad.weight,
                            })
                        });
                    match loaded {
                        Ok((descriptor, slot)) => {
                            descriptors.push(descriptor);
                            slots.push(slot);
                        }
                        Err(err) => omit(&process_logger, &mut omitted, err),
                    }
                }
                ResolutionEngine::Priority(PriorityMatch::new(descriptors, timeout))
            }
            ResolutionPolicy::OrderedChain => {
                let mut links = Vec::new();
                for (index, entry) in modules.handlers.iter().enumerate() {
                    if entry.accept.is_some() {
                        tracing::warn!(module = %entry.module, "accept list ignored under the ordered_chain policy");
                    }
                    match instantiate(&catalog.chain_handlers, ModuleKind::ChainHandler, index, entry) {
                        Ok((handler, slot)) => {
                            links.push(ChainLink::new(entry.module.clone(), handler));
                            slots.push(slot);
                        }
                        Err(err) => omit(&process_logger, &mut omitted, err),
                    }
                }
                ResolutionEngine::OrderedChain(OrderedChain::new(links, timeout))
            }
        };

        let sniffers = SnifferFanout::new();
        for (index, entry) in modules.sniffers.iter().enumerate() {
            let loaded = instantiate(&catalog.sniffers, ModuleKind::Sniffer, index, entry).and_then(
                |(sniffer, slot)| {
                    sniffers
                        .register(&entry.module, sniffer)
                        .map_err(|source| RegistryError::Lane {
                            kind: ModuleKind::Sniffer,
                            module: entry.module.clone(),
                            source,
                        })
                        .map(|()| slot)
                },
            );
            match loaded {
                Ok(slot) => slots.push(slot),
                Err(err) => omit(&process_logger, &mut omitted, err),
            }
        }

        tracing::info!(
            loggers = log_fanout.len(),
            wrapper = wrapper.is_some(),
            policy = ?engine.policy(),
            handlers = engine.len(),
            sniffers = sniffers.len(),
            omitted = omitted.len(),
            "Module registry ready"
        );

        Ok(Self {
            sniffers,
            engine,
            parser,
            wrapper,
            log_fanout,
            slots,
            omitted,
            close_grace: config.timeouts.drain(),
        })
    }

    pub fn parser(&self) -> &dyn Parser {
        self.parser.as_ref()
    }

    pub fn wrapper(&self) -> Option<&dyn ConnectionWrapper> {
        self.wrapper.as_deref()
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    pub fn sniffers(&self) -> &SnifferFanout {
        &self.sniffers
    }

    pub fn log_fanout(&self) -> &Arc<LogFanout> {
        &self.log_fanout
    }

    /// Logger for a client connection.
    pub fn connection_logger(&self, id: ConnectionId) -> ConnectionLogger {
        ConnectionLogger::new(id, Arc::clone(&self.log_fanout))
    }

    /// Optional slots that failed to load and were left out.
    pub fn omitted(&self) -> &[RegistryError] {
        &self.omitted
    }

    /// Current configuration of every live module, in initialization order.
    pub fn snapshot(&self) -> Vec<ModuleSnapshot> {
        self.slots
            .iter()
            .map(|slot| ModuleSnapshot {
                kind: slot.kind,
                slot: slot.index,
                module: slot.module.clone(),
                format: slot.conf.format(),
                data: slot.conf.read(),
            })
            .collect()
    }

    /// Release every module, in reverse initialization order.
    pub fn shutdown(self) {
        let ModuleRegistry {
            sniffers,
            engine,
            parser,
            wrapper,
            log_fanout,
            close_grace,
            ..
        } = self;

        sniffers.close(close_grace);
        drop(sniffers);
        drop(engine);
        drop(parser);
        drop(wrapper);
        tracing::info!("Module registry shut down");
        log_fanout.close(close_grace);
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("loggers", &self.log_fanout.len())
            .field("wrapper", &self.wrapper.is_some())
            .field("engine", &self.engine)
            .field("sniffers", &self.sniffers.len())
            .finish()
    }
}

/// Build one module from its entry, isolating constructor panics.
fn instantiate<T: ?Sized>(
    table: &HashMap<String, Factory<T>>,
    kind: ModuleKind,
    index: usize,
    entry: &ModuleEntry,
) -> Result<(Arc<T>, Slot), RegistryError> {
    let factory = table
        .get(&entry.module)
        .ok_or_else(|| RegistryError::UnknownModule {
            kind,
            module: entry.module.clone(),
        })?;
    let conf = entry
        .config_handle()
        .map_err(|source| RegistryError::Config {
            kind,
            module: entry.module.clone(),
            source,
        })?;
    let observer = conf.observer();

    let instance = run_isolated(|| factory(conf))
        .unwrap_or_else(|panic| Err(ModuleError::failed(format!("constructor panicked: {panic}"))))
        .map_err(|source| RegistryError::Construction {
            kind,
            module: entry.module.clone(),
            source,
        })?;

    tracing::debug!(kind = %kind, module = %entry.module, slot = index, "Module initialized");
    Ok((
        instance,
        Slot {
            kind,
            index,
            module: entry.module.clone(),
            conf: observer,
        },
    ))
}

fn omit(logger: &ConnectionLogger, omitted: &mut Vec<RegistryError>, err: RegistryError) {
    tracing::error!(error = %err, "Optional module omitted");
    logger.log(&format!("module omitted: {err}"));
    omitted.push(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ChainResponse, Request, Response};
    use crate::module::{ChainHandler, Handler, ModuleResult, ParseError, ParserInstance, RequestSink};
    use crate::resolution::AcceptPattern;
    use crate::stream::Input;
    use std::sync::Mutex;

    struct NullParser;

    impl ParserInstance for NullParser {
        fn parse(&mut self, _input: &mut dyn Input) -> Result<(), ParseError> {
            Ok(())
        }
    }

    impl Parser for NullParser {
        fn create(&self, _: ConnectionLogger, _: RequestSink) -> ModuleResult<Box<dyn ParserInstance>> {
            Ok(Box::new(NullParser))
        }
    }

    struct Writes(ConfigHandle);

    impl Handler for Writes {
        fn accept(&self) -> Vec<AcceptPattern> {
            vec![AcceptPattern::new("*/*", 1.0)]
        }

        fn handle(&self, _: &Request, _: &ConnectionLogger) -> ModuleResult<Option<Response>> {
            self.0.write(ConfigFormat::Json, br#"{"hits":1}"#);
            Ok(None)
        }
    }

    struct Noop;

    impl ChainHandler for Noop {
        fn handle(&self, _: &Request, _: &mut ChainResponse, _: &ConnectionLogger) -> ModuleResult<()> {
            Ok(())
        }
    }

    struct Dropped(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Drop for Dropped {
        fn drop(&mut self) {
            self.1.lock().unwrap().push(self.0);
        }
    }

    struct TrackedParser(#[allow(dead_code)] Dropped);

    impl Parser for TrackedParser {
        fn create(&self, _: ConnectionLogger, _: RequestSink) -> ModuleResult<Box<dyn ParserInstance>> {
            Ok(Box::new(NullParser))
        }
    }

    struct TrackedHandler(#[allow(dead_code)] Dropped);

    impl Handler for TrackedHandler {
        fn accept(&self) -> Vec<AcceptPattern> {
            vec![AcceptPattern::new("*/*", 1.0)]
        }

        fn handle(&self, _: &Request, _: &ConnectionLogger) -> ModuleResult<Option<Response>> {
            Ok(None)
        }
    }

    fn catalog() -> ModuleCatalog {
        let mut catalog = ModuleCatalog::new();
        catalog
            .register_parser("null", |_| Ok(Arc::new(NullParser)))
            .register_handler("writes", |conf| Ok(Arc::new(Writes(conf))))
            .register_handler("broken", |_| -> ModuleResult<Arc<Writes>> {
                Err(ModuleError::Config("missing body".into()))
            })
            .register_chain_handler("noop", |_| Ok(Arc::new(Noop)));
        catalog
    }

    fn config(handlers: &[&str]) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.modules.parser = Some(ModuleEntry::new("null"));
        config.modules.handlers = handlers.iter().map(|name| ModuleEntry::new(*name)).collect();
        config
    }

    #[test]
    fn missing_or_unknown_parser_is_fatal() {
        let mut cfg = config(&[]);
        cfg.modules.parser = None;
        assert!(matches!(
            ModuleRegistry::load(&cfg, &catalog()),
            Err(RegistryError::MissingParser)
        ));

        cfg.modules.parser = Some(ModuleEntry::new("nope"));
        assert!(matches!(
            ModuleRegistry::load(&cfg, &catalog()),
            Err(RegistryError::UnknownModule { kind: ModuleKind::Parser, .. })
        ));
    }

    #[test]
    fn failed_optional_slots_are_omitted() {
        let mut cfg = config(&["broken", "writes", "unknown"]);
        cfg.modules.sniffers.push(ModuleEntry::new("ghost"));
        let registry = ModuleRegistry::load(&cfg, &catalog()).unwrap();

        assert_eq!(registry.engine().len(), 1);
        assert_eq!(registry.omitted().len(), 3);
        assert!(registry.sniffers().is_empty());
        registry.shutdown();
    }

    #[test]
    fn invalid_accept_override_omits_handler() {
        let mut cfg = config(&[]);
        cfg.modules.handlers.push(
            ModuleEntry::new("writes").with_accept(vec![AcceptPattern::new("text/html", f64::INFINITY)]),
        );
        let registry = ModuleRegistry::load(&cfg, &catalog()).unwrap();
        assert!(registry.engine().is_empty());
        assert!(matches!(registry.omitted()[0], RegistryError::InvalidAccept { .. }));
    }

    #[test]
    fn policy_selects_handler_table() {
        let mut cfg = config(&["noop"]);
        cfg.resolution.policy = ResolutionPolicy::OrderedChain;
        let registry = ModuleRegistry::load(&cfg, &catalog()).unwrap();
        assert_eq!(registry.engine().policy(), ResolutionPolicy::OrderedChain);
        assert_eq!(registry.engine().len(), 1);

        // "noop" is only a chain handler.
        cfg.resolution.policy = ResolutionPolicy::Priority;
        let registry = ModuleRegistry::load(&cfg, &catalog()).unwrap();
        assert!(registry.engine().is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_module_writes() {
        let registry = ModuleRegistry::load(&config(&["writes"]), &catalog()).unwrap();
        let before = registry.snapshot();
        assert_eq!(before.len(), 2);
        assert_eq!(before[1].kind, ModuleKind::Handler);
        assert!(before[1].data.is_empty());

        let request = Arc::new(Request::builder(crate::http::Method::Get, "/").build());
        let logger = registry.connection_logger(ConnectionId::new());
        registry.engine().resolve(&request, &logger).await;

        let after = registry.snapshot();
        assert_eq!(after[1].format, ConfigFormat::Json);
        assert_eq!(after[1].data, br#"{"hits":1}"#);
    }

    #[test]
    fn shutdown_releases_handlers_before_parser() {
        let drops = Arc::new(Mutex::new(Vec::new()));
        let mut catalog = ModuleCatalog::new();
        let parser_drops = Arc::clone(&drops);
        catalog.register_parser("tracked", move |_| {
            Ok(Arc::new(TrackedParser(Dropped("parser", Arc::clone(&parser_drops)))))
        });
        let handler_drops = Arc::clone(&drops);
        catalog.register_handler("tracked", move |_| {
            Ok(Arc::new(TrackedHandler(Dropped("handler", Arc::clone(&handler_drops)))))
        });

        let mut cfg = ServerConfig::default();
        cfg.modules.parser = Some(ModuleEntry::new("tracked"));
        cfg.modules.handlers.push(ModuleEntry::new("tracked"));

        ModuleRegistry::load(&cfg, &catalog).unwrap().shutdown();
        assert_eq!(*drops.lock().unwrap(), vec!["handler", "parser"]);
    }
}
