//! Response envelopes produced by route handlers.
//!
//! Handlers never write to the wire. They return one of these values and the
//! response builder turns it into headers and a body.

use crate::config::Configuration;
use http::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io;

pub const MIME_JSON: &str = "application/json";

/// Decoded query string, last duplicate wins.
pub type Query = HashMap<String, String>;

/// An opened media file and its length at open time.
#[derive(Debug)]
pub struct MediaFile {
    pub file: File,
    pub size: u64,
}

/// Body of a GET response.
#[derive(Debug)]
pub enum GetBody {
    Json(Value),
    File(MediaFile),
}

#[derive(Debug)]
pub struct GetResponse {
    pub status: StatusCode,
    pub mime_type: &'static str,
    pub body: GetBody,
}

impl GetResponse {
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            mime_type: MIME_JSON,
            body: GetBody::Json(body),
        }
    }

    #[must_use]
    pub fn file(mime_type: &'static str, media: MediaFile) -> Self {
        Self {
            status: StatusCode::OK,
            mime_type,
            body: GetBody::File(media),
        }
    }

    /// 400 envelope carrying a handler-specific code such as `BAD_THUMBNAIL`.
    #[must_use]
    pub fn bad_request(code: &str) -> Self {
        Self::json(StatusCode::BAD_REQUEST, json!({ "ok": false, "code": code }))
    }
}

/// HEAD responses report a size instead of carrying a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: StatusCode,
    pub mime_type: &'static str,
    pub size: Option<u64>,
}

impl HeadResponse {
    #[must_use]
    pub fn new(status: StatusCode, mime_type: &'static str, size: Option<u64>) -> Self {
        Self {
            status,
            mime_type,
            size,
        }
    }
}

/// POST responses are always JSON; uploads are never echoed back as files.
#[derive(Debug, Clone, PartialEq)]
pub struct PostResponse {
    pub status: StatusCode,
    pub mime_type: &'static str,
    pub body: Value,
}

impl PostResponse {
    #[must_use]
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            mime_type: MIME_JSON,
            body,
        }
    }
}

pub type GetHandler = fn(&Configuration, &Query) -> io::Result<GetResponse>;
pub type HeadHandler = fn(&Configuration, &Query) -> io::Result<HeadResponse>;
pub type PostHandler = fn(&Configuration, &Query, &[u8]) -> io::Result<PostResponse>;
