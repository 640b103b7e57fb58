use super::types::{GetResponse, HeadResponse, Query, MIME_JSON};
use crate::config::Configuration;
use http::StatusCode;
use serde_json::{json, Value};
use std::io;

/// Landing payload: server version and the (currently empty) video listing.
pub fn get_page(_config: &Configuration, _query: &Query) -> io::Result<GetResponse> {
    Ok(GetResponse::json(
        StatusCode::OK,
        json!({
            "ok": true,
            "version": version(),
            "videos": [],
        }),
    ))
}

pub fn head_page(_config: &Configuration, _query: &Query) -> io::Result<HeadResponse> {
    Ok(HeadResponse::new(StatusCode::OK, MIME_JSON, None))
}

fn version() -> Value {
    json!({
        "readable": env!("CARGO_PKG_VERSION"),
        "major": env!("CARGO_PKG_VERSION_MAJOR").parse::<u64>().unwrap_or_default(),
        "minor": env!("CARGO_PKG_VERSION_MINOR").parse::<u64>().unwrap_or_default(),
        "patch": env!("CARGO_PKG_VERSION_PATCH").parse::<u64>().unwrap_or_default(),
    })
}
