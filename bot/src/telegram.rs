//! Minimal Telegram Bot API client: long polling and plain text replies.

use crate::error::{BotError, BotResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

/// Telegram rejects `sendMessage` text longer than this many characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

const MAX_COMMAND_LEN: usize = 32;

/// A slash command split into its name and whitespace separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
    /// Bot username after `@`, as in `/start@my_bot`.
    pub mention: Option<String>,
}

fn is_command_token(token: &str, max_len: usize) -> bool {
    !token.is_empty()
        && token.len() <= max_len
        && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Command {
    /// Returns `None` for plain text. `/wallet@my_bot abc` yields `wallet` + `["abc"]`.
    /// The name must directly follow the slash, so `/ hello` is plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;
        let (head, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

        let (name, mention) = match head.split_once('@') {
            Some((name, mention)) => (name, Some(mention)),
            None => (head, None),
        };
        if !is_command_token(name, MAX_COMMAND_LEN) {
            return None;
        }
        if let Some(mention) = mention {
            if !is_command_token(mention, usize::MAX) {
                return None;
            }
        }

        Some(Self {
            name: name.to_lowercase(),
            args: tail.split_whitespace().map(str::to_string).collect(),
            mention: mention.map(str::to_string),
        })
    }

    /// Whether a bot named `username` should handle this command. Commands
    /// without a mention are for everyone.
    pub fn is_addressed_to(&self, username: Option<&str>) -> bool {
        match (&self.mention, username) {
            (Some(mention), Some(username)) => mention.eq_ignore_ascii_case(username),
            _ => true,
        }
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, preferring
/// to break after a newline.
pub fn split_message(text: &str, max_chars: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = match rest[..limit].rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    /// `poll_timeout` is the long-poll window; the HTTP timeout is padded past it.
    pub fn new(api_url: &str, token: &str, poll_timeout: Duration) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> BotResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let envelope: TelegramResponse<T> = response.json().await?;

        if !envelope.ok {
            let code = envelope.error_code.unwrap_or(status.as_u16() as i64);
            let description = envelope
                .description
                .unwrap_or_else(|| "no description".to_string());
            warn!("Telegram {} failed ({}): {}", method, code, description);
            return Err(BotError::Telegram { code, description });
        }

        envelope.result.ok_or_else(|| BotError::Telegram {
            code: status.as_u16() as i64,
            description: format!("{} returned no result", method),
        })
    }

    pub async fn get_me(&self) -> BotResult<User> {
        self.call("getMe", &serde_json::json!({})).await
    }

    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> BotResult<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: &["message"],
        };
        let updates: Vec<Update> = self.call("getUpdates", &request).await?;
        if !updates.is_empty() {
            debug!("Received {} updates from offset {}", updates.len(), offset);
        }
        Ok(updates)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> BotResult<Message> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
        };
        self.call("sendMessage", &request).await
    }
}
