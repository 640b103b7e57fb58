//! Per-connection request loop.
//!
//! A session waits for a request under a deadline, answers it, and either
//! waits again (keep-alive) or closes. Request-level failures become
//! responses; only transport failures end a session with an error.

use super::request::{parse_request, Framing, ParsedRequest};
use super::service::AppService;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const READ_CHUNK: usize = 4096;

/// The socket operations a session needs beyond `Read + Write`.
pub trait Connection: Read + Write {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn shutdown_write(&self) -> io::Result<()>;
}

impl Connection for may::net::TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        may::net::TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

impl Connection for std::net::TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::net::TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Why a session ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// End of stream, or the peer reset the connection.
    PeerClosed,
    /// No complete request arrived before the deadline.
    TimedOut,
    /// The last response was not keep-alive.
    Completed,
    /// Bytes could not be framed; a 400 was sent.
    Rejected,
    /// The server is shutting down.
    ShuttingDown,
}

/// Serve `stream` until it closes, then half-close the write side.
pub fn serve_connection<C: Connection>(
    mut stream: C,
    peer: SocketAddr,
    service: &AppService,
    running: &AtomicBool,
) -> io::Result<CloseReason> {
    debug!(%peer, "Peer connected");
    let result = run_session(&mut stream, peer, service, running);
    if let Err(e) = stream.shutdown_write() {
        trace!(%peer, error = %e, "Shutdown of write side failed");
    }
    match &result {
        Ok(CloseReason::TimedOut) => debug!(
            %peer,
            "Connection timed out; peer probably did not close their connection on time"
        ),
        Ok(reason) => debug!(%peer, ?reason, "Peer disconnected"),
        Err(_) => {}
    }
    result
}

fn run_session<C: Connection>(
    stream: &mut C,
    peer: SocketAddr,
    service: &AppService,
    running: &AtomicBool,
) -> io::Result<CloseReason> {
    let config = service.config();
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if !running.load(Ordering::Acquire) {
            return Ok(CloseReason::ShuttingDown);
        }

        let deadline = Instant::now() + config.session_timeout;
        let mut received_at = (!buf.is_empty()).then(Instant::now);
        let request: ParsedRequest = loop {
            let arrival = received_at.unwrap_or_else(Instant::now);
            match parse_request(&buf, config.max_request_bytes, arrival) {
                Ok(Framing::Complete(request, used)) => {
                    buf.drain(..used);
                    break request;
                }
                Ok(Framing::Partial) => {}
                Err(err) => {
                    let response = service.reject_framing(&err, arrival);
                    return match response.write_to(stream) {
                        Ok(()) => Ok(CloseReason::Rejected),
                        Err(e) if is_disconnect(&e) => Ok(CloseReason::PeerClosed),
                        Err(e) => Err(e),
                    };
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(CloseReason::TimedOut);
            }
            stream.set_read_timeout(Some(remaining))?;
            match stream.read(&mut chunk) {
                Ok(0) => {
                    if !buf.is_empty() {
                        debug!(%peer, buffered = buf.len(), "Peer closed mid-request");
                    }
                    return Ok(CloseReason::PeerClosed);
                }
                Ok(n) => {
                    received_at.get_or_insert_with(Instant::now);
                    buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    return Ok(CloseReason::TimedOut);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if is_disconnect(&e) => return Ok(CloseReason::PeerClosed),
                Err(e) => return Err(e),
            }
        };

        let mut response = service.call(&request, peer);
        if !running.load(Ordering::Acquire) {
            response.keep_alive = false;
        }
        let keep_alive = response.keep_alive;
        match response.write_to(stream) {
            Ok(()) => {}
            Err(e) if is_disconnect(&e) => return Ok(CloseReason::PeerClosed),
            Err(e) => return Err(e),
        }
        if !keep_alive {
            return Ok(CloseReason::Completed);
        }
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
