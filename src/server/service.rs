use super::request::{parse_target, ParsedRequest};
use super::response::{Response, ResponseContext};
use crate::config::Configuration;
use crate::error::RequestError;
use crate::ids::RequestId;
use crate::router::Router;
use http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span};

/// Turns one framed request into one response.
///
/// Order of evaluation: origin authorization, target parsing, verb dispatch,
/// routing. Each step short-circuits with an error envelope, so no request
/// reaches a handler unless it was authorized and well-formed. Nothing here
/// touches the socket, which keeps the pipeline testable without a server.
#[derive(Clone)]
pub struct AppService {
    config: Arc<Configuration>,
    router: Arc<Router>,
}

impl AppService {
    #[must_use]
    pub fn new(config: Arc<Configuration>, router: Arc<Router>) -> Self {
        Self { config, router }
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn call(&self, req: &ParsedRequest, peer: SocketAddr) -> Response {
        let request_id = RequestId::adopt_or_generate(req.header("x-request-id"));
        let span = debug_span!(
            "request",
            %request_id,
            method = %req.method,
            target = %req.target,
            %peer,
        );
        let _entered = span.enter();

        let head = req.method == Method::HEAD;
        let origin = req.origin();
        let mut ctx = ResponseContext {
            allow_origin: None,
            keep_alive: req.keep_alive,
            received_at: req.received_at,
            timing: self.config.response_time,
            request_id: Some(request_id.to_string()),
        };

        if !self.config.cors.is_allowed(origin, peer.ip()) {
            let err = RequestError::Unauthorized;
            debug!(mode = self.config.cors.mode(), origin, "Origin rejected");
            return ctx.error(err.status(), Some(&err.to_string()), None, head);
        }
        ctx.allow_origin = origin.map(str::to_owned);

        let target = match parse_target(&req.target) {
            Ok(target) => target,
            Err(err) => {
                debug!(error = %err, "Rejected request target");
                return ctx.error(err.status(), Some(&err.to_string()), None, head);
            }
        };

        let config = self.config.as_ref();
        let routed = match req.method {
            Method::GET => self
                .router
                .get(config, &target.path, &target.query)
                .map(|res| ctx.from_get(res)),
            Method::HEAD => self
                .router
                .head(config, &target.path, &target.query)
                .map(|res| ctx.from_head(res)),
            Method::POST => self
                .router
                .post(config, &target.path, &target.query, &req.body)
                .map(|res| ctx.from_post(res)),
            ref other => {
                let err = RequestError::UnsupportedMethod(other.to_string());
                debug!(error = %err, "Rejected method");
                return ctx.error(err.status(), Some(&err.to_string()), None, false);
            }
        };
        let response = routed.unwrap_or_else(|err| ctx.from_io_error(&err, &target.path, head));

        debug!(
            status = response.status.as_u16(),
            path = %target.path,
            elapsed_us = u64::try_from(req.received_at.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Request complete"
        );
        response
    }

    /// 400 for bytes that could not be framed as a request. The connection
    /// is closed afterwards since its framing can no longer be trusted.
    pub fn reject_framing(&self, err: &RequestError, received_at: Instant) -> Response {
        debug!(error = %err, "Unframeable request");
        let ctx = ResponseContext {
            allow_origin: None,
            keep_alive: false,
            received_at,
            timing: self.config.response_time,
            request_id: None,
        };
        ctx.error(err.status(), Some(&err.to_string()), None, false)
    }
}
