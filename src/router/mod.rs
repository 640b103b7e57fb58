//! # Router Module
//!
//! Maps `(method, path)` to a handler. Three tables exist, one per verb the
//! server accepts (GET, HEAD, POST); any other verb is rejected by the
//! service before routing.
//!
//! ## Matching
//!
//! Paths are compared verbatim after normalization by
//! [`parse_target`](crate::server::request::parse_target), so `/page`,
//! `//page/` and `/./page` all reach the same handler. There is no prefix
//! or wildcard matching.
//!
//! ## Unmatched paths
//!
//! GET and POST answer `404 {"ok":false,"code":"NOT_FOUND","resource":<path>}`;
//! HEAD answers a bodiless 404.
//!
//! ## Handler failures
//!
//! Handlers report client mistakes as envelopes (for example
//! `400 BAD_THUMBNAIL`). I/O failures are returned as `io::Error` and mapped
//! by the response builder, not here.

mod core;

pub use core::{not_found_body, Router, RouterBuilder};
