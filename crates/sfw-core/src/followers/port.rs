use async_trait::async_trait;

use crate::{domain::EntityId, followers::types::FollowerPage};

/// Why a single page request failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// Network failure or timeout.
    #[error("network error: {0}")]
    Transient(String),

    /// Upstream asked us to slow down (HTTP 429).
    #[error("rate limited by upstream")]
    RateLimited,

    /// Any other non-200 status.
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    /// 200 with a body that isn't a follower page.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl PageError {
    /// Non-200 statuses other than 429 are not worth retrying.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PageError::Status { .. })
    }
}

/// Port for the member-listing API (Smule today).
#[async_trait]
pub trait FollowerSource: Send + Sync {
    async fn fetch_page(
        &self,
        entity: &EntityId,
        offset: usize,
        limit: usize,
    ) -> std::result::Result<FollowerPage, PageError>;
}
