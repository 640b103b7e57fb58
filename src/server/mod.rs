//! # Server Module
//!
//! The HTTP/1.1 side of Cobble: framing bytes into requests, running each
//! connection as a keep-alive session, and serializing responses.
//!
//! ## Components
//!
//! - [`HttpServer`] / [`ServerHandle`] - listener, acceptor coroutine, shutdown
//! - [`session`] - the per-connection read/answer loop with its idle deadline
//! - [`AppService`] - authorization, target parsing and routing for one request
//! - [`request`] - `httparse` framing and path/query normalization
//! - [`response`] - status line, headers and JSON/file bodies
//!
//! ## Request Flow
//!
//! ```text
//! accept -> session -> parse_request -> AppService::call -> Response::write_to
//!              ^                                                   |
//!              +------------------- keep-alive --------------------+
//! ```

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;
pub mod session;

pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_request, parse_target, Framing, ParsedRequest, ParsedTarget};
pub use response::{Body, Response, ResponseContext};
pub use service::AppService;
pub use session::{serve_connection, CloseReason, Connection};
