use crate::domain::{ChatId, UserId};

/// Cross-messenger inbound text message.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: String,
}

/// Limits of a messenger implementation. Messages are always sent as HTML.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
