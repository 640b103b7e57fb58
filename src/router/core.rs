use crate::config::Configuration;
use crate::handlers::{
    media, page, GetHandler, GetResponse, HeadHandler, HeadResponse, PostHandler, PostResponse,
    Query,
};
use http::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io;
use tracing::debug;

/// Immutable per-verb route tables.
///
/// Lookups are exact matches on the normalized path; there are no patterns
/// or parameters. The router is built once and shared behind an `Arc`, so
/// lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct Router {
    get: HashMap<&'static str, GetHandler>,
    head: HashMap<&'static str, HeadHandler>,
    post: HashMap<&'static str, PostHandler>,
}

impl Router {
    #[must_use]
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// The media API: `/page`, `/thumb` and `/video`.
    #[must_use]
    pub fn media() -> Self {
        Self::builder()
            .get("/page", page::get_page)
            .head("/page", page::head_page)
            .get("/thumb", media::thumbnail_get)
            .head("/thumb", media::thumbnail_head)
            .get("/video", media::video_get)
            .head("/video", media::video_head)
            .build()
    }

    pub fn get(&self, config: &Configuration, path: &str, query: &Query) -> io::Result<GetResponse> {
        match self.get.get(path) {
            Some(handler) => handler(config, query),
            None => {
                debug!(path, method = "GET", "No route");
                Ok(GetResponse::json(StatusCode::NOT_FOUND, not_found_body(path)))
            }
        }
    }

    pub fn head(
        &self,
        config: &Configuration,
        path: &str,
        query: &Query,
    ) -> io::Result<HeadResponse> {
        match self.head.get(path) {
            Some(handler) => handler(config, query),
            None => {
                debug!(path, method = "HEAD", "No route");
                Ok(HeadResponse::new(
                    StatusCode::NOT_FOUND,
                    crate::handlers::types::MIME_JSON,
                    None,
                ))
            }
        }
    }

    pub fn post(
        &self,
        config: &Configuration,
        path: &str,
        query: &Query,
        body: &[u8],
    ) -> io::Result<PostResponse> {
        match self.post.get(path) {
            Some(handler) => handler(config, query, body),
            None => {
                debug!(path, method = "POST", "No route");
                Ok(PostResponse::json(StatusCode::NOT_FOUND, not_found_body(path)))
            }
        }
    }

    /// Registered `(method, path)` pairs, sorted, for startup logging.
    #[must_use]
    pub fn routes(&self) -> Vec<(&'static str, &'static str)> {
        let mut routes: Vec<_> = self
            .get
            .keys()
            .map(|p| ("GET", *p))
            .chain(self.head.keys().map(|p| ("HEAD", *p)))
            .chain(self.post.keys().map(|p| ("POST", *p)))
            .collect();
        routes.sort_unstable_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)));
        routes
    }
}

/// Envelope for a path with no route.
#[must_use]
pub fn not_found_body(path: &str) -> Value {
    json!({ "ok": false, "code": "NOT_FOUND", "resource": path })
}

/// Collects handlers before freezing them into a [`Router`].
///
/// Registering the same path twice for one verb keeps the last handler.
#[derive(Debug, Default)]
pub struct RouterBuilder {
    routes: Router,
}

impl RouterBuilder {
    #[must_use]
    pub fn get(mut self, path: &'static str, handler: GetHandler) -> Self {
        self.routes.get.insert(path, handler);
        self
    }

    #[must_use]
    pub fn head(mut self, path: &'static str, handler: HeadHandler) -> Self {
        self.routes.head.insert(path, handler);
        self
    }

    #[must_use]
    pub fn post(mut self, path: &'static str, handler: PostHandler) -> Self {
        self.routes.post.insert(path, handler);
        self
    }

    #[must_use]
    pub fn build(self) -> Router {
        self.routes
    }
}
