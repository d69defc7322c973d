//! Handler returning a fixed response.

use serde::Deserialize;

use crate::http::{ChainResponse, Method, Request, Response};
use crate::module::{ConfigHandle, Handler, ModuleError, ModuleResult};
use crate::observability::logging::ConnectionLogger;
use crate::resolution::matcher::AcceptPattern;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StaticSettings {
    status: u16,
    content_type: String,
    body: String,
    path_prefix: Option<String>,
    accept: Vec<AcceptPattern>,
}

impl Default for StaticSettings {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: String::new(),
            path_prefix: None,
            accept: vec![AcceptPattern::new("*/*", 0.1)],
        }
    }
}

/// Serves the same response to every request under `path_prefix`.
#[derive(Debug)]
pub struct StaticHandler {
    path_prefix: Option<String>,
    accept: Vec<AcceptPattern>,
    full: Response,
    head_only: Response,
}

impl StaticHandler {
    pub fn from_config(conf: &ConfigHandle) -> ModuleResult<Self> {
        let settings: StaticSettings = conf.read_json()?;
        if !(100..1000).contains(&settings.status) {
            return Err(ModuleError::Config(format!("status {} out of range", settings.status)));
        }

        let mut response = ChainResponse::new(settings.status);
        response.set_header("Content-Type", settings.content_type);
        response.body = settings.body.into_bytes();
        let full = Response::from(response.clone());

        // HEAD keeps the headers, including Content-Length, without the body.
        let mut head_only = full.clone();
        head_only.data.truncate(full.len() - response.body.len());

        Ok(Self {
            path_prefix: settings.path_prefix,
            accept: settings.accept,
            full,
            head_only,
        })
    }
}

impl Handler for StaticHandler {
    fn accept(&self) -> Vec<AcceptPattern> {
        self.accept.clone()
    }

    fn handle(&self, request: &Request, _logger: &ConnectionLogger) -> ModuleResult<Option<Response>> {
        if let Some(prefix) = &self.path_prefix {
            if !request.path().starts_with(prefix.as_str()) {
                return Ok(None);
            }
        }
        Ok(Some(if request.method() == Method::Head {
            self.head_only.clone()
        } else {
            self.full.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ConfigFormat;
    use crate::observability::logging::LogFanout;
    use std::sync::Arc;

    fn handler(json: &str) -> StaticHandler {
        StaticHandler::from_config(&ConfigHandle::preloaded(ConfigFormat::Json, json.as_bytes().to_vec())).unwrap()
    }

    fn logger() -> ConnectionLogger {
        ConnectionLogger::process(Arc::new(LogFanout::new()))
    }

    #[test]
    fn serves_configured_body() {
        let handler = handler(r#"{"status":201,"body":"made","content_type":"text/html"}"#);
        let request = Request::builder(Method::Get, "/x").build();
        let response = handler.handle(&request, &logger()).unwrap().unwrap();

        let text = String::from_utf8(response.data).unwrap();
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.ends_with("Content-Length: 4\r\n\r\nmade"));
    }

    #[test]
    fn head_omits_body() {
        let handler = handler(r#"{"body":"hello"}"#);
        let request = Request::builder(Method::Head, "/").build();
        let response = handler.handle(&request, &logger()).unwrap().unwrap();
        assert!(String::from_utf8(response.data).unwrap().ends_with("Content-Length: 5\r\n\r\n"));
    }

    #[test]
    fn path_prefix_limits_scope() {
        let handler = handler(r#"{"path_prefix":"/api"}"#);
        let outside = Request::builder(Method::Get, "/home").build();
        assert!(handler.handle(&outside, &logger()).unwrap().is_none());
        let inside = Request::builder(Method::Get, "/api/v1").build();
        assert!(handler.handle(&inside, &logger()).unwrap().is_some());
    }

    #[test]
    fn default_accepts_anything_at_low_weight() {
        let handler = StaticHandler::from_config(&ConfigHandle::new()).unwrap();
        assert_eq!(handler.accept(), vec![AcceptPattern::new("*/*", 0.1)]);
    }
}
