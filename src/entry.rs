//! Worker `fetch` entry point.

use crate::config::ServiceConfig;
use crate::dispatch::Dispatcher;
use crate::errors::ConfigError;
use crate::handler;
use crate::mailer::SmtpConnector;
use worker::{event, Context, Env, Request, Response, Result};

#[event(fetch)]
async fn fetch(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let config = match ServiceConfig::from_env(&env) {
        Ok(config) => config,
        Err(e) => {
            worker::console_error!("[contact-dispatch] {}: {}", ConfigError::CODE, e);
            return Response::error("Service is not configured", 500);
        }
    };
    let dispatcher = Dispatcher::new(SmtpConnector::new(config.log_level), config);
    handler::handle(req, &dispatcher).await
}
