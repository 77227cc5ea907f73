//! Telegram adapter (teloxide).
//!
//! Implements the `oldclean-core` messaging ports over the Telegram Bot API:
//! [`TelegramMessenger`] for outbound HTML messages and
//! [`listener::TelegramInbound`] for operator replies.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode};

use tokio::time::sleep;

pub mod listener;

use oldclean_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

pub use listener::TelegramInbound;

/// Build both operator-channel ports over one bot client.
pub fn ports(token: &str) -> (TelegramMessenger, TelegramInbound) {
    let bot = Bot::new(token);
    (TelegramMessenger::new(bot.clone()), TelegramInbound::new(bot))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Messaging(format!("telegram error: {e}"))
    }

    /// Run a request, retrying once when Telegram asks us to back off.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::warn!(retry_after = ?d, "telegram flood control; retrying");
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}
