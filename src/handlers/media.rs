//! Thumbnail and video lookup under the storage directory.
//!
//! Media ids are unsigned integers taken from the `idx` query parameter and
//! map to `<data>/<dir>/<id>.<ext>`. Since the id is parsed as a number the
//! resulting path can never leave its directory.

use super::types::{GetResponse, HeadResponse, MediaFile, Query};
use crate::config::Configuration;
use http::StatusCode;
use std::fs::{File, Metadata};
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// A family of media files sharing a directory, extension and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaKind {
    pub directory: &'static str,
    pub extension: &'static str,
    pub mime_type: &'static str,
    /// Envelope code for a missing or invalid `idx`.
    pub bad_request_code: &'static str,
}

pub const THUMBNAIL: MediaKind = MediaKind {
    directory: "thumbnails",
    extension: "webp",
    mime_type: "image/webp",
    bad_request_code: "BAD_THUMBNAIL",
};

pub const VIDEO: MediaKind = MediaKind {
    directory: "videos",
    extension: "webm",
    mime_type: "video/webm",
    bad_request_code: "BAD_VIDEO",
};

impl MediaKind {
    #[must_use]
    pub fn path(&self, config: &Configuration, id: u64) -> PathBuf {
        config
            .data_path
            .join(self.directory)
            .join(format!("{id}.{}", self.extension))
    }

    /// Open the file for streaming.
    pub fn open(&self, config: &Configuration, id: u64) -> io::Result<MediaFile> {
        let file = File::open(self.path(config, id))?;
        let size = regular_len(&file.metadata()?)?;
        Ok(MediaFile { file, size })
    }

    /// Size of the file without opening a transfer.
    pub fn size(&self, config: &Configuration, id: u64) -> io::Result<u64> {
        regular_len(&std::fs::metadata(self.path(config, id))?)
    }

    fn get(&self, config: &Configuration, query: &Query) -> io::Result<GetResponse> {
        match media_id(query) {
            Some(id) => Ok(GetResponse::file(self.mime_type, self.open(config, id)?)),
            None => {
                debug!(code = self.bad_request_code, "Missing or invalid idx");
                Ok(GetResponse::bad_request(self.bad_request_code))
            }
        }
    }

    fn head(&self, config: &Configuration, query: &Query) -> io::Result<HeadResponse> {
        match media_id(query) {
            Some(id) => Ok(HeadResponse::new(
                StatusCode::OK,
                self.mime_type,
                Some(self.size(config, id)?),
            )),
            None => Ok(HeadResponse::new(
                StatusCode::BAD_REQUEST,
                self.mime_type,
                None,
            )),
        }
    }
}

/// Only regular files are media; anything else at the path is reported missing.
fn regular_len(metadata: &Metadata) -> io::Result<u64> {
    if metadata.is_file() {
        Ok(metadata.len())
    } else {
        Err(io::Error::new(io::ErrorKind::NotFound, "media path is not a regular file"))
    }
}

fn media_id(query: &Query) -> Option<u64> {
    query.get("idx").and_then(|idx| idx.parse().ok())
}

pub fn thumbnail_get(config: &Configuration, query: &Query) -> io::Result<GetResponse> {
    THUMBNAIL.get(config, query)
}

pub fn thumbnail_head(config: &Configuration, query: &Query) -> io::Result<HeadResponse> {
    THUMBNAIL.head(config, query)
}

pub fn video_get(config: &Configuration, query: &Query) -> io::Result<GetResponse> {
    VIDEO.get(config, query)
}

pub fn video_head(config: &Configuration, query: &Query) -> io::Result<HeadResponse> {
    VIDEO.head(config, query)
}
