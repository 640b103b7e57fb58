use crate::error::status_code_name;
use crate::handlers::{GetBody, GetResponse, HeadResponse, MediaFile, PostResponse};
use crate::handlers::types::MIME_JSON;
use crate::logging::{log_error_chain, Severity};
use http::StatusCode;
use serde_json::{json, Value};
use smallvec::SmallVec;
use std::io::{self, Read, Write};
use std::time::Instant;

/// Value of the `Server` header.
pub const SERVER_NAME: &str = concat!("cobble/", env!("CARGO_PKG_VERSION"));

/// Generic reason sent with every 500; details stay in the logs.
pub const SERVER_ERROR_REASON: &str = "Please try again later";

type ResponseHeaders = SmallVec<[(&'static str, String); 8]>;

/// Payload of a wire response.
#[derive(Debug)]
pub enum Body {
    Bytes(Vec<u8>),
    File(MediaFile),
    /// HEAD: advertise a length, send nothing.
    Head(u64),
}

impl Body {
    fn content_length(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File(media) => media.size,
            Body::Head(len) => *len,
        }
    }
}

/// A response ready to be written to the connection.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: ResponseHeaders,
    pub body: Body,
    pub keep_alive: bool,
}

impl Response {
    /// Header value by exact name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize the status line, headers and body.
    ///
    /// File bodies are copied straight from disk; a file that shrank since it
    /// was opened is reported as `UnexpectedEof` since the advertised length
    /// can no longer be honoured.
    pub fn write_to<W: Write>(self, out: &mut W) -> io::Result<()> {
        let mut head = String::with_capacity(256);
        head.push_str("HTTP/1.1 ");
        head.push_str(self.status.as_str());
        head.push(' ');
        head.push_str(self.status.canonical_reason().unwrap_or("Unknown"));
        head.push_str("\r\n");
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("Content-Length: ");
        head.push_str(&self.body.content_length().to_string());
        head.push_str("\r\nConnection: ");
        head.push_str(if self.keep_alive { "keep-alive" } else { "close" });
        head.push_str("\r\n\r\n");
        out.write_all(head.as_bytes())?;

        match self.body {
            Body::Bytes(bytes) => out.write_all(&bytes)?,
            Body::File(media) => {
                let copied = io::copy(&mut media.file.take(media.size), out)?;
                if copied != media.size {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("media file shrank: sent {copied} of {} bytes", media.size),
                    ));
                }
            }
            Body::Head(_) => {}
        }
        out.flush()
    }
}

/// Per-request facts every response needs.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    /// `Origin` to echo back; set only once authorization passed.
    pub allow_origin: Option<String>,
    pub keep_alive: bool,
    pub received_at: Instant,
    /// Stamp `responseTime` / `X-Response-Time`.
    pub timing: bool,
    pub request_id: Option<String>,
}

impl ResponseContext {
    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.received_at.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn headers(&self, mime_type: &str) -> ResponseHeaders {
        let mut headers = ResponseHeaders::new();
        headers.push(("Server", SERVER_NAME.to_string()));
        headers.push(("Content-Type", mime_type.to_string()));
        if let Some(origin) = &self.allow_origin {
            headers.push(("Access-Control-Allow-Origin", origin.clone()));
        }
        if let Some(id) = &self.request_id {
            headers.push(("X-Request-Id", id.clone()));
        }
        headers
    }

    fn stamp_header(&self, headers: &mut ResponseHeaders) {
        if self.timing {
            headers.push(("X-Response-Time", self.elapsed_ms().to_string()));
        }
    }

    fn json(&self, status: StatusCode, mime_type: &str, mut body: Value) -> Response {
        if self.timing {
            if let Value::Object(map) = &mut body {
                map.insert("responseTime".to_string(), Value::from(self.elapsed_ms()));
            }
        }
        Response {
            status,
            headers: self.headers(mime_type),
            body: Body::Bytes(body.to_string().into_bytes()),
            keep_alive: self.keep_alive,
        }
    }

    pub fn from_get(&self, res: GetResponse) -> Response {
        match res.body {
            GetBody::Json(body) => self.json(res.status, res.mime_type, body),
            GetBody::File(media) => {
                let mut headers = self.headers(res.mime_type);
                self.stamp_header(&mut headers);
                Response {
                    status: res.status,
                    headers,
                    body: Body::File(media),
                    keep_alive: self.keep_alive,
                }
            }
        }
    }

    pub fn from_head(&self, res: HeadResponse) -> Response {
        let mut headers = self.headers(res.mime_type);
        self.stamp_header(&mut headers);
        Response {
            status: res.status,
            headers,
            body: Body::Head(res.size.unwrap_or(0)),
            keep_alive: self.keep_alive,
        }
    }

    pub fn from_post(&self, res: PostResponse) -> Response {
        self.json(res.status, res.mime_type, res.body)
    }

    /// Error envelope `{ok:false, code, reason?, resource?}`.
    ///
    /// HEAD requests get the status and headers without a body.
    pub fn error(
        &self,
        status: StatusCode,
        reason: Option<&str>,
        resource: Option<&str>,
        head: bool,
    ) -> Response {
        if head {
            return self.from_head(HeadResponse::new(status, MIME_JSON, None));
        }
        let mut body = json!({ "ok": false, "code": status_code_name(status) });
        if let Some(reason) = reason {
            body["reason"] = Value::from(reason);
        }
        if let Some(resource) = resource {
            body["resource"] = Value::from(resource);
        }
        self.json(status, MIME_JSON, body)
    }

    /// Map a handler I/O failure.
    ///
    /// A missing file is the client's problem and becomes 404; anything else
    /// is logged with its cause chain and answered with a generic 500.
    pub fn from_io_error(&self, err: &io::Error, path: &str, head: bool) -> Response {
        if err.kind() == io::ErrorKind::NotFound {
            tracing::debug!(path, error = %err, "Media not found");
            return self.error(StatusCode::NOT_FOUND, None, Some(path), head);
        }
        log_error_chain(Severity::Error, "Request failed", err);
        self.error(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(SERVER_ERROR_REASON),
            None,
            head,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;

    fn ctx() -> ResponseContext {
        ResponseContext {
            allow_origin: Some("https://a.example".into()),
            keep_alive: true,
            received_at: Instant::now(),
            timing: true,
            request_id: None,
        }
    }

    fn wire(res: Response) -> String {
        let mut out = Vec::new();
        res.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn body_json(text: &str) -> Value {
        let (_, body) = text.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_json_response_headers_and_timing() {
        let res = ctx().from_get(GetResponse::json(StatusCode::OK, json!({"ok": true})));
        let text = wire(res);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains(&format!("Server: {SERVER_NAME}\r\n")));
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Access-Control-Allow-Origin: https://a.example\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(!text.contains("X-Response-Time"));
        let body = body_json(&text);
        assert_eq!(body["ok"], true);
        assert!(body["responseTime"].is_u64());
    }

    #[test]
    fn test_json_is_compact() {
        let text = wire(ctx().from_get(GetResponse::json(
            StatusCode::OK,
            json!({"a": [1, 2]}),
        )));
        assert!(text.contains("{\"a\":[1,2]"));
    }

    #[test]
    fn test_no_origin_header_without_authorization() {
        let mut ctx = ctx();
        ctx.allow_origin = None;
        ctx.timing = false;
        let text = wire(ctx.from_get(GetResponse::json(StatusCode::OK, json!({}))));
        assert!(!text.contains("Access-Control-Allow-Origin"));
        assert_eq!(body_json(&text), json!({}));
    }

    #[test]
    fn test_head_has_length_but_no_body() {
        let res = ctx().from_head(HeadResponse::new(StatusCode::OK, "image/webp", Some(1234)));
        let text = wire(res);
        assert!(text.contains("Content-Length: 1234\r\n"));
        assert!(text.contains("Content-Type: image/webp\r\n"));
        assert!(text.contains("X-Response-Time: "));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_file_body_streams() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.rewind().unwrap();
        let res = ctx().from_get(GetResponse::file(
            "video/webm",
            MediaFile { file, size: 10 },
        ));
        let text = wire(res);
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.contains("X-Response-Time: "));
        assert!(text.ends_with("\r\n\r\n0123456789"));
    }

    #[test]
    fn test_short_file_is_an_error() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abc").unwrap();
        file.rewind().unwrap();
        let res = ctx().from_get(GetResponse::file("image/webp", MediaFile { file, size: 10 }));
        let err = res.write_to(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_error_envelope() {
        let mut ctx = ctx();
        ctx.keep_alive = false;
        let text = wire(ctx.error(StatusCode::UNAUTHORIZED, Some("Can't access the API"), None, false));
        assert!(text.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        let body = body_json(&text);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(body["reason"], "Can't access the API");
    }

    #[test]
    fn test_io_errors() {
        let ctx = ctx();
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        let text = wire(ctx.from_io_error(&not_found, "/thumb", false));
        assert!(text.starts_with("HTTP/1.1 404"));
        assert_eq!(body_json(&text)["resource"], "/thumb");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "secret detail");
        let text = wire(ctx.from_io_error(&denied, "/thumb", false));
        assert!(text.starts_with("HTTP/1.1 500"));
        assert!(!text.contains("secret detail"));
        let body = body_json(&text);
        assert_eq!(body["code"], "SERVER_ERROR");
        assert_eq!(body["reason"], SERVER_ERROR_REASON);

        let text = wire(ctx.from_io_error(&denied, "/thumb", true));
        assert!(text.starts_with("HTTP/1.1 500"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
