//! Sniffer writing one line per request event to the connection logger.

use crate::http::{Request, Response};
use crate::module::{ModuleResult, Sniffer};
use crate::observability::logging::ConnectionLogger;

#[derive(Debug, Default)]
pub struct AccessLog;

impl Sniffer for AccessLog {
    fn got_request(&self, request: &Request, logger: &ConnectionLogger) -> ModuleResult<()> {
        logger.log(&format!(
            "<- {} {} {} ua={:?}",
            request.method(),
            request.url(),
            request.protocol(),
            request.user_agent()
        ));
        Ok(())
    }

    fn got_response(&self, request: &Request, response: &Response, logger: &ConnectionLogger) -> ModuleResult<()> {
        let status = response
            .status()
            .map_or_else(|| "-".to_string(), |status| status.to_string());
        logger.log(&format!(
            "-> {} {} {} {}B",
            request.method(),
            request.path(),
            status,
            response.len()
        ));
        Ok(())
    }

    fn got_request_miss(&self, request: &Request, logger: &ConnectionLogger) -> ModuleResult<()> {
        logger.log(&format!("-> {} {} miss", request.method(), request.path()));
        Ok(())
    }
}
