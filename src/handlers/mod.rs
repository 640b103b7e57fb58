//! Route handlers and the envelopes they return.

pub mod media;
pub mod page;
pub mod types;

pub use types::{
    GetBody, GetHandler, GetResponse, HeadHandler, HeadResponse, MediaFile, PostHandler,
    PostResponse, Query,
};
