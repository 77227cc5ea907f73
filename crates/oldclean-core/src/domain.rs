/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// The single identity allowed to approve or deny a cleanup run.
///
/// Reports and acknowledgements go to `chat_id`; only replies sent by `user_id`
/// are considered decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operator {
    pub user_id: UserId,
    pub chat_id: ChatId,
}

impl Operator {
    /// Private-chat operator: Telegram uses the user id as the chat id.
    pub fn private(id: i64) -> Self {
        Self {
            user_id: UserId(id),
            chat_id: ChatId(id),
        }
    }
}

/// Monotonic id of one confirmation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
