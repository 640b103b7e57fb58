//! # Cobble
//!
//! **Cobble** is a small HTTP/1.1 media backend built on the `may` coroutine
//! runtime. It serves a status page and streams numbered thumbnails and
//! videos from a storage directory, gated by an origin allow-list or a set
//! of client networks.
//!
//! ## Architecture
//!
//! - **[`config`]** - TOML configuration and its validation
//! - **[`cors`]** - origin (domain) and peer address (CIDR) authorization
//! - **[`server`]** - request framing, sessions, the acceptor and responses
//! - **[`router`]** - exact-match GET/HEAD/POST tables
//! - **[`handlers`]** - the page and media handlers
//! - **[`worker_pool`]** - the coroutine executor pool and graceful drain
//! - **[`logging`]** - `tracing` setup with syslog-style severities
//! - **[`cli`]** - the `cobble` command line
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cobble::config::Configuration;
//! use cobble::router::Router;
//! use cobble::runtime_config::RuntimeConfig;
//! use cobble::server::{AppService, HttpServer};
//! use cobble::worker_pool::PoolConfig;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = Configuration::load(Path::new("cobble.toml"))?;
//! let pool = PoolConfig::new(config.threads, &RuntimeConfig::from_env());
//! let service = AppService::new(Arc::new(config), Arc::new(Router::media()));
//! let handle = HttpServer::new(service, pool).start()?;
//! handle.wait_ready()?;
//! // ... later
//! handle.shutdown()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Runtime Configuration
//!
//! - `COBBLE_STACK_SIZE` - coroutine stack size (default `0x10000`)
//! - `COBBLE_SHUTDOWN_GRACE_MS` - drain window on shutdown (default `2000`)
//! - `COBBLE_LOG_LEVEL`, `COBBLE_LOG_FORMAT`, `COBBLE_LOG_FILE` - logging

pub mod cli;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod worker_pool;

pub use config::Configuration;
pub use cors::CorsPolicy;
pub use error::RequestError;
pub use ids::RequestId;
pub use router::Router;
pub use server::{AppService, HttpServer, ServerHandle};
