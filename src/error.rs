//! Request-level error kinds and the status/code table used by error envelopes.

use http::StatusCode;
use std::fmt;

/// Failures that are recovered into a client-facing response.
///
/// Every variant maps to a 4xx status; resource failures travel as
/// [`std::io::Error`] and are mapped by the response builder instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request target does not match `path["?"query]`.
    MalformedTarget(String),
    /// The target contains a `..` segment.
    PathTraversal(String),
    /// A verb other than GET, HEAD or POST.
    UnsupportedMethod(String),
    /// The request head or body could not be framed.
    BadFraming(String),
    /// The peer's origin or address is not on the allow-list.
    Unauthorized,
}

impl RequestError {
    /// HTTP status this error is reported with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MalformedTarget(target) => {
                write!(f, "An invalid path/query string was parsed: {target:?}")
            }
            RequestError::PathTraversal(target) => {
                write!(f, "Path traversal segment in target: {target:?}")
            }
            RequestError::UnsupportedMethod(method) => write!(f, "Unsupported method: {method}"),
            RequestError::BadFraming(detail) => write!(f, "Malformed request: {detail}"),
            RequestError::Unauthorized => write!(f, "Can't access the API"),
        }
    }
}

impl std::error::Error for RequestError {}

/// Machine-readable `code` field for an error envelope.
#[must_use]
pub fn status_code_name(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        _ => "SERVER_ERROR",
    }
}
