use crate::config::Configuration;
use crate::log_at;
use crate::logging::Severity;
use crate::router::Router;
use crate::runtime_config::RuntimeConfig;
use crate::server::{AppService, HttpServer};
use crate::worker_pool::PoolConfig;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

const SIGNAL_POLL: Duration = Duration::from_millis(100);

/// Command-line interface for the Cobble media server
#[derive(Parser, Debug)]
#[command(name = "cobble", version, about = "Cobble media server", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(value_name = "CONFIG", env = "COBBLE_CONFIG")]
    pub config: PathBuf,

    /// Validate the configuration and exit without binding
    #[arg(long, default_value_t = false)]
    pub check: bool,
}

/// Load the configuration and either validate it or serve until signalled.
pub fn run(cli: &Cli) -> Result<()> {
    let config = Configuration::load(&cli.config)?;
    if cli.check {
        log_at!(
            Severity::Notice,
            addr = %config.socket_addr(),
            threads = config.threads,
            cors = config.cors.mode(),
            data = %config.data_path.display(),
            "Configuration is valid"
        );
        return Ok(());
    }
    serve(config)
}

/// Run the server until SIGINT/SIGTERM or until the acceptor dies.
pub fn serve(config: Configuration) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    register_signals(&shutdown)?;

    let runtime = RuntimeConfig::from_env();
    let pool = PoolConfig::new(config.threads, &runtime);
    info!(
        cors = config.cors.mode(),
        data = %config.data_path.display(),
        timeout_ms = u64::try_from(config.session_timeout.as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );

    let service = AppService::new(Arc::new(config), Arc::new(Router::media()));
    for (method, path) in service.router().routes() {
        debug!(method, path, "Route registered");
    }
    let handle = HttpServer::new(service, pool)
        .start()
        .context("Failed to start the listener")?;
    log_at!(Severity::Notice, addr = %handle.local_addr(), "Server spinning up");

    while !shutdown.load(Ordering::Acquire) && handle.is_running() {
        thread::sleep(SIGNAL_POLL);
    }
    if !shutdown.load(Ordering::Acquire) {
        error!("Acceptor exited unexpectedly");
    }

    handle.shutdown()?;
    log_at!(Severity::Notice, "Server shut down gracefully");
    Ok(())
}

#[cfg(unix)]
fn register_signals(flag: &Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(flag))
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn register_signals(_flag: &Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
