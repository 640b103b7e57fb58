//! # Runtime Configuration
//!
//! Environment-driven tuning of the coroutine runtime. These knobs are kept
//! out of the TOML file because they describe the host, not the service.
//!
//! ## Environment Variables
//!
//! ### `COBBLE_STACK_SIZE`
//!
//! Stack size for session coroutines. Accepts decimal (`32768`) or
//! hexadecimal (`0x10000`). Default: `0x10000` (64 KB).
//!
//! ### `COBBLE_SHUTDOWN_GRACE_MS`
//!
//! How long shutdown waits for in-flight sessions before cancelling them at
//! their next suspension point. Default: `2000`.
//!
//! ```rust
//! use cobble::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.stack_size > 0);
//! ```

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_GRACE_MS: u64 = 2000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Drain window granted to sessions during shutdown
    pub shutdown_grace: Duration,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("COBBLE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let grace_ms = env::var("COBBLE_SHUTDOWN_GRACE_MS")
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(DEFAULT_GRACE_MS);
        RuntimeConfig {
            stack_size,
            shutdown_grace: Duration::from_millis(grace_ms),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
            shutdown_grace: Duration::from_millis(DEFAULT_GRACE_MS),
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
