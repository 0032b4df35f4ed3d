use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    domain::EntityId,
    followers::{
        port::{FollowerSource, PageError},
        types::RawFollower,
    },
    retry::{retry, Backoff, RetryDecision, RetryError, RetryPolicy},
};

#[derive(Clone, Copy, Debug)]
pub struct FetchSettings {
    pub page_size: usize,
    /// Attempts per page before the page counts as failed.
    pub page_attempts: u32,
    /// Linear backoff step between attempts on the same page.
    pub page_backoff: Duration,
    /// Consecutive failed requests (across pages) that abort the whole fetch.
    pub breaker_threshold: u32,
    /// Self-throttle between page requests.
    pub page_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 20,
            page_attempts: 3,
            page_backoff: Duration::from_millis(1500),
            breaker_threshold: 3,
            page_delay: Duration::from_millis(500),
        }
    }
}

/// Why a follower list could not be obtained. Never means "zero followers".
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{entity}: circuit open after {failures} consecutive failed requests (offset {offset}): {last}")]
    CircuitOpen {
        entity: EntityId,
        failures: u32,
        offset: usize,
        last: PageError,
    },

    #[error("{entity}: page at offset {offset} failed after {attempts} attempt(s): {error}")]
    PageFailed {
        entity: EntityId,
        offset: usize,
        attempts: u32,
        error: PageError,
    },

    #[error("{entity}: full page at offset {offset} brought no new followers, pagination is not advancing")]
    Stalled { entity: EntityId, offset: usize },

    #[error("{entity}: follower list came back empty")]
    Empty { entity: EntityId },

    #[error("{entity}: no follower entry carried a usable account id")]
    NoUsableMembers { entity: EntityId },
}

#[derive(Debug)]
struct CircuitBreaker {
    threshold: u32,
    consecutive: u32,
}

impl CircuitBreaker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Returns true once the breaker is open.
    fn record_failure(&mut self) -> bool {
        self.consecutive += 1;
        self.is_open()
    }

    fn record_success(&mut self) {
        self.consecutive = 0;
    }

    fn is_open(&self) -> bool {
        self.consecutive >= self.threshold
    }
}

/// Pulls the complete follower list of one entity, page by page.
///
/// A list is only returned when every page was retrieved: a page that ultimately fails
/// aborts the fetch, since a partial list would read as a wave of unfollows.
pub struct PagedFetcher {
    source: Arc<dyn FollowerSource>,
    settings: FetchSettings,
}

impl PagedFetcher {
    pub fn new(source: Arc<dyn FollowerSource>, settings: FetchSettings) -> Self {
        Self { source, settings }
    }

    pub async fn fetch_all(
        &self,
        entity: &EntityId,
    ) -> std::result::Result<Vec<RawFollower>, FetchError> {
        let limit = self.settings.page_size.max(1);
        let policy = RetryPolicy::new(
            self.settings.page_attempts,
            Backoff::Linear(self.settings.page_backoff),
        );
        let mut breaker = CircuitBreaker::new(self.settings.breaker_threshold);

        let mut all = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0usize;
        let mut pages = 0usize;

        loop {
            let source = &self.source;
            let page = retry(
                &policy,
                move |attempt| {
                    debug!(entity = %entity, offset, attempt, "requesting follower page");
                    source.fetch_page(entity, offset, limit)
                },
                |err: &PageError, attempt| {
                    let open = breaker.record_failure();
                    warn!(entity = %entity, offset, attempt, error = %err, "follower page request failed");
                    if open || !err.is_retryable() {
                        RetryDecision::GiveUp
                    } else {
                        RetryDecision::Retry
                    }
                },
            )
            .await;

            let entries = match page {
                Ok(page) => page.into_entries(),
                Err(RetryError { attempts, error }) => {
                    if breaker.is_open() {
                        return Err(FetchError::CircuitOpen {
                            entity: entity.clone(),
                            failures: breaker.consecutive,
                            offset,
                            last: error,
                        });
                    }
                    return Err(FetchError::PageFailed {
                        entity: entity.clone(),
                        offset,
                        attempts,
                        error,
                    });
                }
            };
            breaker.record_success();
            pages += 1;

            let received = entries.len();
            let fresh_ids = entries
                .iter()
                .filter_map(RawFollower::id)
                .filter(|id| seen.insert(id.clone()))
                .count();
            all.extend(entries);
            if received < limit {
                break;
            }
            if fresh_ids == 0 {
                warn!(entity = %entity, offset, "full page repeated known followers");
                return Err(FetchError::Stalled {
                    entity: entity.clone(),
                    offset,
                });
            }

            offset += limit;
            sleep(self.settings.page_delay).await;
        }

        if all.is_empty() {
            return Err(FetchError::Empty {
                entity: entity.clone(),
            });
        }

        info!(entity = %entity, followers = all.len(), pages, "fetched follower list");
        Ok(all)
    }
}
