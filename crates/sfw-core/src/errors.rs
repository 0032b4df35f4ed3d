use std::path::PathBuf;

use crate::followers::fetcher::FetchError;

/// Core error type for the follower watcher.
///
/// Adapter crates map their specific errors into the port error enums
/// (`PageError`, `ChannelError`); this type covers everything the core itself can fail on.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("snapshot store error: {path}: {reason}")]
    Store { path: PathBuf, reason: String },

    #[error("cycle failed: {0}")]
    CycleFailed(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
