use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{MessagingCapabilities, TextMessage},
    Result,
};

/// Outbound half of the operator channel.
///
/// Telegram is the only implementation today; the core never sees Telegram types.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
}

/// Inbound half of the operator channel.
///
/// The channel may carry unrelated traffic; filtering by sender is the caller's job.
#[async_trait]
pub trait InboundPort: Send + Sync {
    /// Forward inbound text messages into `sink` until `cancel` fires.
    ///
    /// Must not return before the underlying listener has fully stopped: once this
    /// future resolves, no further message may be pushed into `sink`.
    async fn listen(&self, sink: mpsc::Sender<TextMessage>, cancel: CancellationToken)
        -> Result<()>;
}
