use super::service::AppService;
use super::session::serve_connection;
use crate::log_at;
use crate::logging::Severity;
use crate::worker_pool::{ExecutorPool, PoolConfig, SessionMetrics};
use anyhow::{bail, Result};
use may::coroutine::JoinHandle;
use may::net::TcpListener;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The listening side of the server.
///
/// Binds the configured address, then accepts connections on a dedicated
/// coroutine and hands each one to the executor pool as a new session.
pub struct HttpServer {
    service: AppService,
    pool: PoolConfig,
}

/// Handle to a running server
///
/// Dropping the handle leaves the server running; call
/// [`ServerHandle::shutdown`] to stop it.
pub struct ServerHandle {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    acceptor_failed: Arc<AtomicBool>,
    acceptor: JoinHandle<()>,
    pool: Arc<ExecutorPool>,
}

impl HttpServer {
    #[must_use]
    pub fn new(service: AppService, pool: PoolConfig) -> Self {
        Self { service, pool }
    }

    /// Bind the listener and start accepting.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the acceptor
    /// coroutine cannot be spawned.
    pub fn start(self) -> io::Result<ServerHandle> {
        let pool = Arc::new(ExecutorPool::new(self.pool));
        let listener = TcpListener::bind(self.service.config().socket_addr())?;
        let addr = listener.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));
        let acceptor_failed = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let pool = Arc::clone(&pool);
            let running = Arc::clone(&running);
            let failed = Arc::clone(&acceptor_failed);
            let service = self.service;
            let builder = may::coroutine::Builder::new()
                .name("acceptor".to_string())
                .stack_size(pool.config().stack_size);
            // SAFETY: the acceptor owns its listener and shared state and only
            // suspends inside `accept`.
            unsafe {
                builder.spawn(move || {
                    if let Err(e) = accept_loop(&listener, &service, &pool, &running) {
                        error!(error = %e, "Acceptor stopped");
                        failed.store(true, Ordering::Release);
                        running.store(false, Ordering::Release);
                    }
                })
            }?
        };

        info!(%addr, workers = pool.config().workers, "Listening");
        Ok(ServerHandle {
            addr,
            running,
            acceptor_failed,
            acceptor,
            pool,
        })
    }
}

fn accept_loop(
    listener: &TcpListener,
    service: &AppService,
    pool: &ExecutorPool,
    running: &Arc<AtomicBool>,
) -> io::Result<()> {
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::Interrupted
                        | io::ErrorKind::WouldBlock
                ) =>
            {
                debug!(error = %e, "Transient accept failure");
                continue;
            }
            Err(e) if !running.load(Ordering::Acquire) => {
                debug!(error = %e, "Accept interrupted by shutdown");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !running.load(Ordering::Acquire) {
            debug!(%peer, "Refusing connection during shutdown");
            return Ok(());
        }

        let service = service.clone();
        let flag = Arc::clone(running);
        if let Err(e) = pool.spawn(peer, move || serve_connection(stream, peer, &service, &flag)) {
            warn!(%peer, error = %e, "Dropping connection");
        }
    }
}

impl ServerHandle {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `false` once shutdown began or the acceptor died.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.acceptor.is_done()
    }

    #[must_use]
    pub fn metrics(&self) -> &SessionMetrics {
        self.pool.metrics()
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// Polls the listening address until a TCP connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        let probe = match self.addr {
            SocketAddr::V4(v4) if v4.ip().is_unspecified() => {
                SocketAddr::from(([127, 0, 0, 1], v4.port()))
            }
            SocketAddr::V6(v6) if v6.ip().is_unspecified() => {
                SocketAddr::from((std::net::Ipv6Addr::LOCALHOST, v6.port()))
            }
            addr => addr,
        };
        for _ in 0..50 {
            if TcpStream::connect(probe).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting, drain sessions, and join everything.
    ///
    /// # Errors
    ///
    /// Fails when the acceptor died on its own or any session panicked; the
    /// server is fully stopped either way.
    pub fn shutdown(self) -> Result<()> {
        log_at!(Severity::Notice, addr = %self.addr, "Server spinning down");
        self.running.store(false, Ordering::Release);

        let cancelled = !self.acceptor.is_done();
        if cancelled {
            // SAFETY: cancelling unwinds the acceptor out of `accept`, dropping
            // the listener so no further connections are taken.
            unsafe { self.acceptor.coroutine().cancel() };
        }
        let acceptor_panicked = self.acceptor.join().is_err() && !cancelled;

        debug!(sessions = self.pool.tracked(), "Draining sessions");
        let report = self.pool.drain(self.pool.config().shutdown_grace);
        let metrics = self.pool.metrics();
        info!(
            joined = report.joined,
            cancelled = report.cancelled,
            accepted = metrics.get_accepted_count(),
            completed = metrics.get_completed_count(),
            failed = metrics.get_failed_count(),
            panicked = report.panicked,
            "Sessions drained"
        );

        if self.acceptor_failed.load(Ordering::Acquire) || acceptor_panicked || !report.is_clean() {
            bail!("Server spun down ungracefully");
        }
        Ok(())
    }
}
