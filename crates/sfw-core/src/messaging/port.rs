use async_trait::async_trait;

use crate::{domain::ChatId, messaging::types::ChannelError};

/// Messaging channel port (Telegram today).
///
/// Implementations make exactly one delivery attempt per call; retrying and pacing
/// belong to the dispatcher.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> std::result::Result<(), ChannelError>;
}
