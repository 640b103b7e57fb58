use crate::error::RequestError;
use crate::handlers::Query;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Instant;

/// Headers inspected per request before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Upper bound on headers httparse will accept in one request head.
pub const MAX_HEADERS: usize = 64;

/// Request headers with lowercase names, in wire order.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// A fully framed request: head plus `Content-Length` body.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    /// Raw request target as sent by the client
    pub target: String,
    /// HTTP minor version (`0` or `1`)
    pub version: u8,
    pub headers: HeaderVec,
    pub body: Vec<u8>,
    /// Whether the client asked to keep the connection open
    pub keep_alive: bool,
    /// When the first byte of this request was read
    pub received_at: Instant,
}

impl ParsedRequest {
    /// First header with the given lowercase name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }
}

/// Outcome of trying to frame a request from buffered bytes.
#[derive(Debug)]
pub enum Framing {
    /// A request and the number of buffered bytes it used.
    Complete(ParsedRequest, usize),
    /// More bytes are needed.
    Partial,
}

/// Frame one request from the front of `buf`.
///
/// Bodies are delimited by `Content-Length` only; chunked transfer coding is
/// refused. A request whose head or total size exceeds `max_bytes` is
/// rejected rather than buffered.
pub fn parse_request(
    buf: &[u8],
    max_bytes: usize,
    received_at: Instant,
) -> Result<Framing, RequestError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            if buf.len() >= max_bytes {
                return Err(RequestError::BadFraming("request head too large".into()));
            }
            return Ok(Framing::Partial);
        }
        Err(e) => return Err(RequestError::BadFraming(e.to_string())),
    };

    let method = req
        .method
        .ok_or_else(|| RequestError::BadFraming("missing method".into()))
        .and_then(|m| {
            Method::from_bytes(m.as_bytes())
                .map_err(|_| RequestError::BadFraming(format!("invalid method {m:?}")))
        })?;
    let target = req
        .path
        .ok_or_else(|| RequestError::BadFraming("missing request target".into()))?
        .to_string();
    let version = req.version.unwrap_or(1);

    let mut headers = HeaderVec::new();
    for h in req.headers.iter() {
        let value = String::from_utf8_lossy(h.value).trim().to_string();
        headers.push((Arc::from(h.name.to_ascii_lowercase()), value));
    }

    let mut content_length: Option<usize> = None;
    let mut connection_close = version == 0;
    for (name, value) in &headers {
        match name.as_ref() {
            "content-length" => {
                let length: usize = value
                    .parse()
                    .map_err(|_| RequestError::BadFraming(format!("invalid content-length {value:?}")))?;
                if content_length.is_some_and(|first| first != length) {
                    return Err(RequestError::BadFraming("conflicting content-length".into()));
                }
                content_length = Some(length);
            }
            "transfer-encoding" => {
                return Err(RequestError::BadFraming(
                    "transfer-encoding is not supported".into(),
                ));
            }
            "connection" => {
                for token in value.split(',').map(str::trim) {
                    if token.eq_ignore_ascii_case("close") {
                        connection_close = true;
                    } else if token.eq_ignore_ascii_case("keep-alive") {
                        connection_close = false;
                    }
                }
            }
            _ => {}
        }
    }

    let total = head_len
        .checked_add(content_length.unwrap_or(0))
        .filter(|total| *total <= max_bytes)
        .ok_or_else(|| RequestError::BadFraming("request too large".into()))?;
    if buf.len() < total {
        return Ok(Framing::Partial);
    }

    Ok(Framing::Complete(
        ParsedRequest {
            method,
            target,
            version,
            headers,
            body: buf[head_len..total].to_vec(),
            keep_alive: !connection_close,
            received_at,
        },
        total,
    ))
}

/// A request target split into its normalized path and decoded query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    pub path: String,
    pub query: Query,
}

/// Split a request target into a normalized path and a query map.
///
/// The target must look like `path["?"query]` where `path` is non-empty and
/// holds no `&` or `?`, and `query` holds no `?`. Empty and `.` segments are
/// dropped; a `..` segment is refused. Query pairs are form-urlencoded and a
/// repeated key keeps its last value.
pub fn parse_target(raw: &str) -> Result<ParsedTarget, RequestError> {
    let (path, query) = match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    };
    if path.is_empty() || path.contains('&') || query.is_some_and(|q| q.contains('?')) {
        return Err(RequestError::MalformedTarget(raw.to_string()));
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => return Err(RequestError::PathTraversal(raw.to_string())),
            segment => {
                normalized.push('/');
                normalized.push_str(segment);
            }
        }
    }
    if normalized.is_empty() {
        normalized.push('/');
    }

    let query = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedTarget {
        path: normalized,
        query,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(buf: &[u8]) -> (ParsedRequest, usize) {
        match parse_request(buf, 16 * 1024, Instant::now()).unwrap() {
            Framing::Complete(req, used) => (req, used),
            Framing::Partial => panic!("expected a complete request"),
        }
    }

    #[test]
    fn test_target_with_query() {
        let parsed = parse_target("/thumb?idx=42&size=small").unwrap();
        assert_eq!(parsed.path, "/thumb");
        assert_eq!(parsed.query.get("idx").map(String::as_str), Some("42"));
        assert_eq!(parsed.query.get("size").map(String::as_str), Some("small"));
    }

    #[test]
    fn test_duplicate_keys_keep_last() {
        let parsed = parse_target("/page?a=1&a=2&a=3").unwrap();
        assert_eq!(parsed.query.len(), 1);
        assert_eq!(parsed.query["a"], "3");
    }

    #[test]
    fn test_key_without_value_and_empty_pieces() {
        let parsed = parse_target("/page?flag&&x=1&").unwrap();
        assert_eq!(parsed.query["flag"], "");
        assert_eq!(parsed.query["x"], "1");
        assert_eq!(parsed.query.len(), 2);
    }

    #[test]
    fn test_value_split_on_first_equals() {
        let parsed = parse_target("/p?expr=a=b").unwrap();
        assert_eq!(parsed.query["expr"], "a=b");
    }

    #[test]
    fn test_query_is_decoded() {
        let parsed = parse_target("/p?name=two%20words&q=a+b").unwrap();
        assert_eq!(parsed.query["name"], "two words");
        assert_eq!(parsed.query["q"], "a b");
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(parse_target("/").unwrap().path, "/");
        assert_eq!(parse_target("//page/").unwrap().path, "/page");
        assert_eq!(parse_target("/./page/./").unwrap().path, "/page");
        assert_eq!(parse_target("/a//b").unwrap().path, "/a/b");
        assert_eq!(parse_target("page").unwrap().path, "/page");
        assert!(parse_target("/page?").unwrap().query.is_empty());
    }

    #[test]
    fn test_malformed_targets() {
        for raw in ["", "?a=b", "/a&b", "/a?b?c", "/a&b?c=d"] {
            assert!(
                matches!(parse_target(raw), Err(RequestError::MalformedTarget(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_dot_dot_rejected() {
        assert!(matches!(
            parse_target("/thumb/../../etc/passwd"),
            Err(RequestError::PathTraversal(_))
        ));
        assert!(matches!(parse_target("/.."), Err(RequestError::PathTraversal(_))));
        // Only whole segments count.
        assert_eq!(parse_target("/a..b").unwrap().path, "/a..b");
    }

    #[test]
    fn test_parse_simple_get() {
        let raw = b"GET /page HTTP/1.1\r\nHost: x\r\nOrigin: https://a.example\r\n\r\n";
        let (req, used) = complete(raw);
        assert_eq!(used, raw.len());
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.target, "/page");
        assert_eq!(req.version, 1);
        assert!(req.keep_alive);
        assert_eq!(req.origin(), Some("https://a.example"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_keep_alive_negotiation() {
        let (req, _) = complete(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n");
        assert!(!req.keep_alive);
        let (req, _) = complete(b"GET / HTTP/1.0\r\n\r\n");
        assert!(!req.keep_alive);
        let (req, _) = complete(b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n");
        assert!(req.keep_alive);
    }

    #[test]
    fn test_body_framing_and_pipelining() {
        let raw = b"POST /up HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcdGET /page HTTP/1.1\r\n\r\n";
        let (req, used) = complete(raw);
        assert_eq!(req.body, b"abcd");
        let (next, _) = complete(&raw[used..]);
        assert_eq!(next.target, "/page");
    }

    #[test]
    fn test_partial_input() {
        let now = Instant::now();
        assert!(matches!(
            parse_request(b"GET /page HTTP/1.1\r\nHost:", 1024, now),
            Ok(Framing::Partial)
        ));
        assert!(matches!(
            parse_request(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc", 1024, now),
            Ok(Framing::Partial)
        ));
    }

    #[test]
    fn test_framing_errors() {
        let now = Instant::now();
        assert!(parse_request(b"\x01\x02 nonsense\r\n\r\n", 1024, now).is_err());
        assert!(parse_request(
            b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n",
            1024,
            now
        )
        .is_err());
        assert!(parse_request(b"POST / HTTP/1.1\r\nContent-Length: x\r\n\r\n", 1024, now).is_err());
        assert!(parse_request(
            b"POST / HTTP/1.1\r\nContent-Length: 4096\r\n\r\n",
            1024,
            now
        )
        .is_err());
        assert!(parse_request(&[b'A'; 64], 32, now).is_err());
        assert!(matches!(
            parse_request(
                b"POST /page HTTP/1.1\r\nContent-Length: 0\r\nContent-Length: 5\r\n\r\nGET /x",
                1024,
                now
            ),
            Err(RequestError::BadFraming(_))
        ));
    }

    #[test]
    fn test_repeated_equal_content_length_is_accepted() {
        let (req, used) =
            complete(b"POST /page HTTP/1.1\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nhi");
        assert_eq!(req.body, b"hi");
        assert_eq!(used, 63);
    }
}
