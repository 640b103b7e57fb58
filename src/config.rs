//! # Configuration
//!
//! Cobble reads a single TOML file at startup and validates it into an
//! immutable [`Configuration`]. Nothing downstream mutates it; sessions share
//! it through an `Arc`.
//!
//! ```toml
//! [storage]
//! directory = "/srv/cobble"
//!
//! [http]
//! listen = "0.0.0.0"
//! port = 8080
//! threads = 4
//! timeout_secs = 1          # optional, idle wait per request
//! response_time = true      # optional, stamp responseTime / X-Response-Time
//! max_request_bytes = 16384 # optional, head + body
//!
//! [http.cors]
//! force_cidr = false
//! origins = ["https://media.example", "*"]
//! # with force_cidr = true:
//! # origins = { v4 = ["10.0.0.0/8"], v6 = ["fd00::/8"] }
//! ```
//!
//! Invalid values abort startup with a nested error chain describing which
//! key was wrong.

use crate::cors::{CorsPolicy, NetworkList};
use anyhow::{anyhow, bail, Context, Result};
use ipnet::{Ipv4Net, Ipv6Net};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_TIMEOUT_SECS: i64 = 1;
const DEFAULT_MAX_REQUEST_BYTES: usize = 16 * 1024;

/// Validated, read-only server configuration.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub listen_address: IpAddr,
    pub listen_port: u16,
    /// Scheduler worker threads, at least one.
    pub threads: usize,
    pub cors: CorsPolicy,
    /// Root of the media tree (`thumbnails/`, `videos/`).
    pub data_path: PathBuf,
    /// Deadline for each wait on the next request.
    pub session_timeout: Duration,
    /// Whether responses carry timing metadata.
    pub response_time: bool,
    /// Upper bound for a request head plus body.
    pub max_request_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    storage: RawStorage,
    http: RawHttp,
}

#[derive(Debug, Deserialize)]
struct RawStorage {
    directory: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawHttp {
    listen: String,
    port: i64,
    threads: i64,
    timeout_secs: Option<i64>,
    response_time: Option<bool>,
    max_request_bytes: Option<usize>,
    cors: RawCors,
}

#[derive(Debug, Deserialize)]
struct RawCors {
    #[serde(default)]
    force_cidr: bool,
    origins: toml::Value,
}

impl Configuration {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Validate configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text).context("Failed to parse TOML")?;

        let listen_address: IpAddr = raw
            .http
            .listen
            .parse()
            .with_context(|| format!("Listener address {:?} is not an IP address", raw.http.listen))?;
        let listen_port =
            u16::try_from(raw.http.port).map_err(|_| anyhow!("Listener port must be 0-65535"))?;
        if raw.http.threads < 1 {
            bail!("I/O context threads count must be above zero");
        }
        let threads = usize::try_from(raw.http.threads)
            .context("I/O context threads count does not fit this platform")?;

        let timeout_secs = raw.http.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs < 1 {
            bail!("Session timeout must be at least one second");
        }
        let max_request_bytes = raw
            .http
            .max_request_bytes
            .unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
        if max_request_bytes == 0 {
            bail!("Maximum request size must be above zero");
        }

        let cors = parse_cors(&raw.http.cors).context("Invalid [http.cors] section")?;

        Ok(Configuration {
            listen_address,
            listen_port,
            threads,
            cors,
            data_path: raw.storage.directory,
            session_timeout: Duration::from_secs(timeout_secs.unsigned_abs()),
            response_time: raw.http.response_time.unwrap_or(true),
            max_request_bytes,
        })
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(data_path: &Path) -> Self {
        Configuration {
            listen_address: IpAddr::from([127, 0, 0, 1]),
            listen_port: 0,
            threads: 1,
            cors: CorsPolicy::Domains(vec![crate::cors::ANY_ORIGIN.to_string()]),
            data_path: data_path.to_path_buf(),
            session_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS.unsigned_abs()),
            response_time: true,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

fn parse_cors(raw: &RawCors) -> Result<CorsPolicy> {
    if raw.force_cidr {
        let table = raw
            .origins
            .as_table()
            .context("With force_cidr enabled, origins must be a table of v4/v6 network lists")?;
        let v4 = match table.get("v4") {
            Some(value) => string_entries(value, "v4")?
                .into_iter()
                .map(|s| {
                    s.parse::<Ipv4Net>()
                        .with_context(|| format!("Invalid IPv4 network {s:?}"))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let v6 = match table.get("v6") {
            Some(value) => string_entries(value, "v6")?
                .into_iter()
                .map(|s| {
                    s.parse::<Ipv6Net>()
                        .with_context(|| format!("Invalid IPv6 network {s:?}"))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        if let Some(key) = table.keys().find(|k| *k != "v4" && *k != "v6") {
            bail!("Unknown network family {key:?}, expected v4 or v6");
        }
        let networks = NetworkList { v4, v6 };
        if networks.is_empty() {
            warn!("CIDR mode without any network; every request will be refused");
        }
        Ok(CorsPolicy::Networks(networks))
    } else {
        if raw.origins.is_table() {
            bail!("Network origins require force_cidr = true");
        }
        let domains = string_entries(&raw.origins, "origins")?
            .into_iter()
            .map(str::to_owned)
            .collect();
        Ok(CorsPolicy::Domains(domains))
    }
}

fn string_entries<'a>(value: &'a toml::Value, key: &str) -> Result<Vec<&'a str>> {
    let array = value
        .as_array()
        .with_context(|| format!("CORS {key} must be an array"))?;
    array
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .context("One of your CORS origins were not a string type.")
        })
        .collect()
}
