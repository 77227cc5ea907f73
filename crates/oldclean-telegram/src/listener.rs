//! Long-polling listener for operator replies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::Message};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use oldclean_core::{
    domain::{ChatId, UserId},
    messaging::{port::InboundPort, types::TextMessage},
    Result,
};

/// Telegram dates have one-second resolution and come from Telegram's clock.
const CLOCK_SLACK_SECS: i64 = 5;

#[derive(Clone)]
pub struct TelegramInbound {
    bot: Bot,
}

impl TelegramInbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Messages older than the listener are leftovers from before the report.
fn is_stale(sent_at: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    sent_at + chrono::Duration::seconds(CLOCK_SLACK_SECS) < since
}

async fn forward_text(
    msg: Message,
    sink: mpsc::Sender<TextMessage>,
    since: DateTime<Utc>,
) -> ResponseResult<()> {
    let (Some(text), Some(from)) = (msg.text(), msg.from()) else {
        return Ok(());
    };
    if is_stale(msg.date, since) {
        debug!(user = from.id.0, "dropping stale message from before the listener started");
        return Ok(());
    }

    let incoming = TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(from.id.0 as i64),
        username: from.username.clone(),
        text: text.to_string(),
    };
    if sink.send(incoming).await.is_err() {
        debug!("reply sink closed; dropping message");
    }
    Ok(())
}

#[async_trait]
impl InboundPort for TelegramInbound {
    async fn listen(
        &self,
        sink: mpsc::Sender<TextMessage>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let since = Utc::now();
        let handler = Update::filter_message().endpoint(forward_text);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![sink, since])
            .build();
        let token = dispatcher.shutdown_token();

        let dispatch = dispatcher.dispatch();
        tokio::pin!(dispatch);

        tokio::select! {
            _ = &mut dispatch => {
                warn!("telegram dispatcher stopped on its own");
                return Ok(());
            }
            _ = cancel.cancelled() => {}
        }

        // Keep driving the dispatcher until the in-flight poll drains.
        match token.shutdown() {
            Ok(done) => {
                tokio::join!(&mut dispatch, done);
            }
            Err(_) => debug!("dispatcher was idle at shutdown"),
        }
        debug!("telegram listener stopped");
        Ok(())
    }
}
