//! Telegram adapter (teloxide).
//!
//! Implements the `sfw-core` MessagingPort over the Telegram Bot API. One call is one
//! delivery attempt; pacing and retries live in the core dispatcher.

use async_trait::async_trait;
use teloxide::{prelude::*, types::Recipient, ApiError, RequestError};
use tracing::debug;

use sfw_core::{
    domain::ChatId,
    messaging::{port::MessagingPort, types::ChannelError},
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(Bot::new(token))
    }
}

/// Numeric ids (including negative group/channel ids) go by id, anything else is
/// treated as a public channel username.
fn recipient(chat_id: &ChatId) -> Recipient {
    let raw = chat_id.0.trim();
    match raw.parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) if raw.starts_with('@') => Recipient::ChannelUsername(raw.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{raw}")),
    }
}

fn map_err(e: RequestError) -> ChannelError {
    match e {
        RequestError::RetryAfter(d) => ChannelError::RetryAfter(d),
        RequestError::Network(e) => ChannelError::Transient(format!("telegram network error: {e}")),
        RequestError::Io(e) => ChannelError::Transient(format!("telegram io error: {e}")),
        RequestError::InvalidJson { source, .. } => {
            ChannelError::Transient(format!("telegram invalid response: {source}"))
        }
        RequestError::Api(api) => map_api_err(&api),
        other => ChannelError::Permanent(format!("telegram error: {other}")),
    }
}

fn map_api_err(api: &ApiError) -> ChannelError {
    let text = api.to_string();
    if text.contains("Too Many Requests") {
        ChannelError::RateLimited(text)
    } else {
        ChannelError::Permanent(format!("telegram api error: {text}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(
        &self,
        chat_id: &ChatId,
        text: &str,
    ) -> std::result::Result<(), ChannelError> {
        let msg = self
            .bot
            .send_message(recipient(chat_id), text.to_string())
            .await
            .map_err(map_err)?;
        debug!(chat_id = %chat_id.0, message_id = msg.id.0, "telegram message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn numeric_destination_is_a_chat_id() {
        assert_eq!(
            recipient(&ChatId("-1001234567890".to_string())),
            Recipient::Id(teloxide::types::ChatId(-1001234567890))
        );
    }

    #[test]
    fn other_destination_is_a_channel_username() {
        assert_eq!(
            recipient(&ChatId("@followers_feed".to_string())),
            Recipient::ChannelUsername("@followers_feed".to_string())
        );
        assert_eq!(
            recipient(&ChatId("followers_feed".to_string())),
            Recipient::ChannelUsername("@followers_feed".to_string())
        );
    }

    #[test]
    fn retry_after_keeps_the_server_hint() {
        assert_eq!(
            map_err(RequestError::RetryAfter(Duration::from_secs(7))),
            ChannelError::RetryAfter(Duration::from_secs(7))
        );
    }

    #[test]
    fn too_many_requests_text_is_rate_limited() {
        let e = RequestError::Api(ApiError::Unknown(
            "Too Many Requests: retry later".to_string(),
        ));
        assert!(matches!(map_err(e), ChannelError::RateLimited(_)));
    }

    #[test]
    fn other_api_errors_are_permanent() {
        assert!(matches!(
            map_err(RequestError::Api(ApiError::BotBlocked)),
            ChannelError::Permanent(_)
        ));
        assert!(matches!(
            map_err(RequestError::Api(ApiError::ChatNotFound)),
            ChannelError::Permanent(_)
        ));
    }
}
