#![allow(dead_code)]

pub mod media_dir {
    use std::path::Path;
    use tempfile::TempDir;

    pub const THUMB_BYTES: &[u8] = b"RIFF\x10\x00\x00\x00WEBPVP8 fake thumbnail";
    pub const VIDEO_BYTES: &[u8] = b"\x1aE\xdf\xa3 fake webm stream";

    /// Storage tree with `thumbnails/1.webp` and `videos/7.webm`.
    pub fn create() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "thumbnails/1.webp", THUMB_BYTES);
        write(dir.path(), "videos/7.webm", VIDEO_BYTES);
        dir
    }

    fn write(root: &Path, rel: &str, bytes: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    /// Configuration text listening on an ephemeral loopback port.
    pub fn config_toml(data: &Path, cors: &str) -> String {
        format!(
            "[storage]\ndirectory = '{}'\n\n[http]\nlisten = \"127.0.0.1\"\nport = 0\nthreads = 2\ntimeout_secs = 1\n\n[http.cors]\n{cors}\n",
            data.display()
        )
    }
}

pub mod test_server {
    use cobble::config::Configuration;
    use cobble::router::Router;
    use cobble::runtime_config::RuntimeConfig;
    use cobble::server::{AppService, HttpServer, ServerHandle};
    use cobble::worker_pool::PoolConfig;
    use std::net::SocketAddr;
    use std::sync::{Arc, Once};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x10000);
        });
    }

    /// Running server over a temporary media tree, stopped on drop.
    pub struct TestServer {
        handle: Option<ServerHandle>,
        addr: SocketAddr,
        _data: TempDir,
    }

    impl TestServer {
        pub fn start(cors: &str) -> Self {
            setup_may_runtime();
            let data = super::media_dir::create();
            let config = Configuration::from_toml_str(&super::media_dir::config_toml(
                data.path(),
                cors,
            ))
            .unwrap();
            let runtime = RuntimeConfig {
                shutdown_grace: Duration::from_millis(500),
                ..RuntimeConfig::default()
            };
            let pool = PoolConfig::new(config.threads, &runtime);
            let service = AppService::new(Arc::new(config), Arc::new(Router::media()));
            let handle = HttpServer::new(service, pool).start().unwrap();
            handle.wait_ready().unwrap();
            let addr = handle.local_addr();
            Self {
                handle: Some(handle),
                addr,
                _data: data,
            }
        }

        /// Any origin accepted.
        pub fn open() -> Self {
            Self::start("origins = [\"*\"]")
        }

        pub fn addr(&self) -> SocketAddr {
            self.addr
        }

        pub fn handle(&self) -> &ServerHandle {
            self.handle.as_ref().unwrap()
        }

        pub fn shutdown(mut self) -> anyhow::Result<()> {
            self.handle.take().unwrap().shutdown()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                let _ = handle.shutdown();
            }
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// A response split off the wire.
    #[derive(Debug)]
    pub struct WireResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl WireResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    pub fn connect(addr: SocketAddr) -> TcpStream {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Send raw bytes and read until the server closes.
    pub fn exchange(addr: SocketAddr, raw: &str) -> Vec<u8> {
        let mut stream = connect(addr);
        stream.write_all(raw.as_bytes()).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        out
    }

    /// Read exactly one non-HEAD response off a live connection.
    pub fn read_response(stream: &mut TcpStream) -> WireResponse {
        let mut wire = Vec::new();
        let mut byte = [0u8; 1];
        while !wire.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).unwrap();
            wire.push(byte[0]);
        }
        let length: usize = std::str::from_utf8(&wire)
            .unwrap()
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.trim().parse().unwrap())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).unwrap();
        wire.extend_from_slice(&body);
        parse_responses(&wire, false).remove(0)
    }

    /// One request with `Connection: close`.
    pub fn send_request(addr: SocketAddr, method: &str, target: &str, extra: &str) -> WireResponse {
        let raw = format!("{method} {target} HTTP/1.1\r\nHost: test\r\n{extra}Connection: close\r\n\r\n");
        let wire = exchange(addr, &raw);
        let mut responses = parse_responses(&wire, method == "HEAD");
        assert_eq!(responses.len(), 1, "expected exactly one response");
        responses.remove(0)
    }

    /// Split consecutive responses using their `Content-Length`.
    pub fn parse_responses(mut wire: &[u8], head: bool) -> Vec<WireResponse> {
        let mut out = Vec::new();
        while !wire.is_empty() {
            let end = wire
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .expect("response head terminator");
            let head_text = std::str::from_utf8(&wire[..end]).unwrap();
            let mut lines = head_text.split("\r\n");
            let status_line = lines.next().unwrap();
            let status = status_line.split(' ').nth(1).unwrap().parse().unwrap();
            let headers: Vec<(String, String)> = lines
                .map(|line| {
                    let (k, v) = line.split_once(':').unwrap();
                    (k.trim().to_string(), v.trim().to_string())
                })
                .collect();
            let length: usize = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .map(|(_, v)| v.parse().unwrap())
                .unwrap_or(0);
            let body_len = if head { 0 } else { length };
            let rest = &wire[end + 4..];
            out.push(WireResponse {
                status,
                headers,
                body: rest[..body_len].to_vec(),
            });
            wire = &rest[body_len..];
        }
        out
    }
}
