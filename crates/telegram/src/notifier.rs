use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::RequestError;
use tracing::{debug, warn};

use common::{Error, Notifier, RetryPolicy};

/// Sends alerts to every configured chat. Delivery failures are logged and dropped.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<ChatId>,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, chat_ids: &[i64], retry: RetryPolicy) -> Self {
        Self {
            bot,
            chat_ids: chat_ids.iter().map(|&id| ChatId(id)).collect(),
            retry,
        }
    }
}

/// Network trouble and flood control are worth retrying; API rejections are not.
fn classify(e: RequestError) -> Error {
    match e {
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_) => {
            Error::Http(e.to_string())
        }
        other => Error::Other(other.to_string()),
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        for &chat_id in &self.chat_ids {
            let sent = self
                .retry
                .run("telegram_send", || async move {
                    self.bot
                        .send_message(chat_id, text)
                        .await
                        .map(|_| ())
                        .map_err(classify)
                })
                .await;
            match sent {
                Ok(()) => debug!(chat_id = chat_id.0, "Alert delivered"),
                Err(e) => warn!(chat_id = chat_id.0, error = %e, "Failed to send Telegram alert"),
            }
        }
    }
}
