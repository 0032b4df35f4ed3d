//! Smule adapter (follower listing).
//!
//! Talks to the public `profile/followers` endpoint, one page per request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    StatusCode,
};
use sfw_core::{
    domain::EntityId,
    errors::Error,
    followers::{
        port::{FollowerSource, PageError},
        types::FollowerPage,
    },
    Result,
};
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const BODY_SNIPPET_CHARS: usize = 300;

#[derive(Clone, Debug)]
pub struct SmuleClient {
    api_url: String,
    http: reqwest::Client,
}

impl SmuleClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::External(format!("smule http client build failed: {e}")))?;

        Ok(Self {
            api_url: api_url.into(),
            http,
        })
    }
}

#[async_trait]
impl FollowerSource for SmuleClient {
    async fn fetch_page(
        &self,
        entity: &EntityId,
        offset: usize,
        limit: usize,
    ) -> std::result::Result<FollowerPage, PageError> {
        let resp = self
            .http
            .get(&self.api_url)
            .query(&[
                ("accountId", entity.as_str().to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PageError::Transient(format!("smule request error: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| PageError::Transient(format!("smule body read error: {e}")))?;
        debug!(entity = %entity, offset, status = status.as_u16(), bytes = body.len(), "smule response");

        parse_page(status, &body)
    }
}

/// Classify one HTTP response from the followers endpoint.
pub fn parse_page(status: StatusCode, body: &str) -> std::result::Result<FollowerPage, PageError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PageError::RateLimited);
    }
    if status != StatusCode::OK {
        return Err(PageError::Status {
            status: status.as_u16(),
            body: body.chars().take(BODY_SNIPPET_CHARS).collect(),
        });
    }

    let v: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| PageError::Malformed(format!("invalid json: {e}")))?;
    if v.get("list").is_none() {
        return Err(PageError::Malformed(
            "response has no `list` field".to_string(),
        ));
    }
    serde_json::from_value(v).map_err(|e| PageError::Malformed(format!("unexpected shape: {e}")))
}
