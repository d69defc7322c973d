//! Chain handler setting fixed headers and, optionally, a status.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::http::{ChainResponse, Request};
use crate::module::{ChainHandler, ConfigHandle, ModuleError, ModuleResult};
use crate::observability::logging::ConnectionLogger;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HeadersSettings {
    headers: BTreeMap<String, String>,
    status: Option<u16>,
}

#[derive(Debug)]
pub struct HeadersHandler {
    headers: Vec<(String, String)>,
    status: Option<u16>,
}

impl HeadersHandler {
    pub fn from_config(conf: &ConfigHandle) -> ModuleResult<Self> {
        let settings: HeadersSettings = conf.read_json()?;
        if let Some(status) = settings.status {
            if !(100..1000).contains(&status) {
                return Err(ModuleError::Config(format!("status {status} out of range")));
            }
        }
        Ok(Self {
            headers: settings.headers.into_iter().collect(),
            status: settings.status,
        })
    }
}

impl ChainHandler for HeadersHandler {
    fn handle(
        &self,
        _request: &Request,
        response: &mut ChainResponse,
        _logger: &ConnectionLogger,
    ) -> ModuleResult<()> {
        for (name, value) in &self.headers {
            response.set_header(name.as_str(), value.as_str());
        }
        if let Some(status) = self.status {
            response.status = status;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::module::ConfigFormat;
    use crate::observability::logging::LogFanout;
    use std::sync::Arc;

    #[test]
    fn applies_headers_and_status() {
        let conf = ConfigHandle::preloaded(
            ConfigFormat::Json,
            br#"{"headers":{"X-Served-By":"chain"},"status":404}"#.to_vec(),
        );
        let handler = HeadersHandler::from_config(&conf).unwrap();
        let mut response = ChainResponse::default();
        let logger = ConnectionLogger::process(Arc::new(LogFanout::new()));
        handler
            .handle(&Request::builder(Method::Get, "/").build(), &mut response, &logger)
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.header("x-served-by"), Some("chain"));
    }
}
