//! Request correlation ids.

use std::fmt;
use ulid::Ulid;

/// ULID recorded on the request span and echoed as `X-Request-Id`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RequestId(Ulid);

impl RequestId {
    /// Adopt the client's `X-Request-Id` when it is a ULID, otherwise generate one.
    #[must_use]
    pub fn adopt_or_generate(header: Option<&str>) -> Self {
        header
            .and_then(|value| Ulid::from_string(value.trim()).ok())
            .map_or_else(|| Self(Ulid::new()), Self)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
