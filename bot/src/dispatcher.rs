use crate::error::BotResult;
use crate::handlers::BotHandlers;
use crate::retry::RetryPolicy;
use crate::telegram::{split_message, Message, TelegramClient, Update, MAX_MESSAGE_LEN};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Long-polling loop feeding Telegram updates into the handlers.
pub struct Dispatcher {
    telegram: TelegramClient,
    handlers: Arc<BotHandlers>,
    poll_timeout: Duration,
    retry: RetryPolicy,
    offset: i64,
}

impl Dispatcher {
    pub fn new(telegram: TelegramClient, handlers: Arc<BotHandlers>, poll_timeout: Duration) -> Self {
        Self {
            telegram,
            handlers,
            poll_timeout,
            retry: RetryPolicy::default(),
            offset: 0,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Next update id that will be requested.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Polls until `shutdown` resolves. A batch already being handled is
    /// finished before returning.
    pub async fn run<F>(&mut self, shutdown: F) -> BotResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Bot is starting...");

        let mut failures: u32 = 0;
        loop {
            let updates = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping polling");
                    return Ok(());
                }
                updates = self.telegram.get_updates(self.offset, self.poll_timeout) => updates,
            };

            match updates {
                Ok(updates) => {
                    failures = 0;
                    self.dispatch(updates).await;
                }
                Err(e) => {
                    let delay = self.retry.delay(failures);
                    failures = failures.saturating_add(1);
                    warn!("Polling failed (attempt {}), retrying in {:?}: {}", failures, delay, e);

                    tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Fetches and handles a single batch; returns how many updates it held.
    pub async fn poll_once(&mut self) -> BotResult<usize> {
        let updates = self
            .telegram
            .get_updates(self.offset, self.poll_timeout)
            .await?;
        let count = updates.len();
        self.dispatch(updates).await;
        Ok(count)
    }

    /// Messages from one chat are handled in order; different chats run concurrently.
    async fn dispatch(&mut self, updates: Vec<Update>) {
        let mut by_chat: HashMap<i64, Vec<Message>> = HashMap::new();

        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            match update.message {
                Some(message) => by_chat.entry(message.chat.id).or_default().push(message),
                None => debug!("Skipping update {} without a message", update.update_id),
            }
        }

        let mut tasks = JoinSet::new();
        for (chat_id, messages) in by_chat {
            let handlers = Arc::clone(&self.handlers);
            let telegram = self.telegram.clone();
            tasks.spawn(async move {
                for message in messages {
                    handle_and_reply(&handlers, &telegram, chat_id, &message).await;
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Update handler task failed: {}", e);
            }
        }
    }
}

async fn handle_and_reply(
    handlers: &BotHandlers,
    telegram: &TelegramClient,
    chat_id: i64,
    message: &Message,
) {
    let replies = match handlers.handle_message(message).await {
        Ok(replies) => replies,
        Err(e) => {
            error!("Failed to handle message {} in chat {}: {}", message.message_id, chat_id, e);
            return;
        }
    };

    for reply in replies {
        for chunk in split_message(&reply.text, MAX_MESSAGE_LEN) {
            if let Err(e) = telegram.send_message(chat_id, chunk, reply.parse_mode).await {
                error!("Failed to send reply to chat {}: {}", chat_id, e);
                break;
            }
        }
    }
}
