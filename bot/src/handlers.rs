//! Command and chat handlers. Each returns the replies to send; the
//! dispatcher owns the Telegram side.

use crate::agent::Responder;
use crate::config::BotConfig;
use crate::error::{BotError, BotResult};
use crate::memes::TenorClient;
use crate::payments::PaymentVerifier;
use crate::store::{HistoryRole, Store};
use crate::telegram::{Command, Message, ParseMode, User};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub const SOLANA_ADDRESS_LEN: usize = 44;

pub const GREETING: &str = "Hey what would you like to be called and where are you from?";
pub const WALLET_REQUIRED: &str = "Provide your wallet address first. Use /wallet <wallet_address>.";
pub const WALLET_USAGE: &str = "Please provide your Solana wallet address in the following format:\n\
                                `/wallet <your_wallet_address>`";
pub const WALLET_INVALID: &str =
    "Invalid wallet address format. Please ensure it is a valid Solana wallet address.";
pub const WALLET_SAVE_FAILED: &str =
    "There was an error saving your wallet address. Please try again.";
pub const PAYMENT_VERIFIED: &str = "Payment verified!";
pub const PAYMENT_USED: &str = "Payment already used!";
pub const PAYMENT_NOT_FOUND: &str = "Payment not found.";
pub const MEME_USAGE: &str = "Usage: /meme <search terms>";
pub const MEME_DISABLED: &str = "Meme search is not configured.";
pub const MEME_FAILED: &str = "Meme search failed. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: Some(ParseMode::Markdown),
        }
    }
}

/// Solana addresses as accepted by `/wallet`: 44 ASCII letters or digits.
pub fn is_valid_wallet_address(address: &str) -> bool {
    address.len() == SOLANA_ADDRESS_LEN && address.chars().all(|c| c.is_ascii_alphanumeric())
}

pub struct BotHandlers {
    store: Store,
    responder: Responder,
    verifier: Arc<dyn PaymentVerifier>,
    memes: Option<TenorClient>,
    bot_username: Option<String>,
    config: BotConfig,
}

impl BotHandlers {
    pub fn new(
        store: Store,
        responder: Responder,
        verifier: Arc<dyn PaymentVerifier>,
        config: BotConfig,
    ) -> Self {
        Self {
            store,
            responder,
            verifier,
            memes: None,
            bot_username: None,
            config,
        }
    }

    pub fn with_memes(mut self, memes: TenorClient) -> Self {
        self.memes = Some(memes);
        self
    }

    /// Username from `getMe`; commands mentioning another bot are ignored.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Routes an incoming message. Non-text messages, unknown commands and
    /// commands for other bots produce no replies.
    pub async fn handle_message(&self, message: &Message) -> BotResult<Vec<Reply>> {
        let (Some(user), Some(text)) = (&message.from, &message.text) else {
            return Ok(Vec::new());
        };

        if user.is_bot {
            return Ok(Vec::new());
        }

        let Some(command) = Command::parse(text) else {
            return self.chat(user, text).await;
        };

        if !command.is_addressed_to(self.bot_username.as_deref()) {
            debug!("Ignoring /{} addressed to another bot", command.name);
            return Ok(Vec::new());
        }

        match command.name.as_str() {
            "start" => self.start(user).await,
            "wallet" => self.wallet(user, &command.args).await,
            "paid" => self.paid(user).await,
            "meme" => self.meme(&command.args).await,
            other => {
                debug!("Ignoring unknown command /{}", other);
                Ok(Vec::new())
            }
        }
    }

    pub async fn start(&self, user: &User) -> BotResult<Vec<Reply>> {
        self.store.ensure_user(user.id, &user.first_name).await?;
        info!(target: "user", "User {} ({}) started the bot.", user.first_name, user.id);
        Ok(vec![Reply::text(GREETING)])
    }

    #[instrument(skip(self, user, text), fields(telegram_id = user.id))]
    pub async fn chat(&self, user: &User, text: &str) -> BotResult<Vec<Reply>> {
        let user_id = self.store.ensure_user(user.id, &user.first_name).await?;
        let message_count = self.store.increment_message_count(user_id).await?;

        if message_count > self.config.free_message_limit {
            debug!("User {} is over quota ({} messages)", user.id, message_count);
            return Ok(vec![self.quota_reply(user_id).await?]);
        }

        info!(target: "user", "User {} ({}): {}", user.first_name, user.id, text);
        self.store.store_message(user_id, text, HistoryRole::User).await?;
        let history = self
            .store
            .history(user_id, self.config.history_limit)
            .await?;

        match self.responder.respond(&history).await {
            Ok(reply) => {
                info!(target: "bot", "Bot: {}", reply);
                self.store.store_message(user_id, &reply, HistoryRole::Bot).await?;
                Ok(vec![Reply::text(reply)])
            }
            Err(e) => {
                error!("Error in generate_response: {}", e);
                Ok(vec![Reply::text(format!("Error: {}", e))])
            }
        }
    }

    async fn quota_reply(&self, user_id: i64) -> BotResult<Reply> {
        Ok(match self.store.wallet(user_id).await? {
            None => Reply::text(WALLET_REQUIRED),
            Some(_) => Reply::text(format!(
                "Limit reached. Send {} SOL to {} and verify using /paid.",
                self.config.payment_sol(),
                self.config.operator_wallet
            )),
        })
    }

    pub async fn wallet(&self, user: &User, args: &[String]) -> BotResult<Vec<Reply>> {
        let user_id = self.store.ensure_user(user.id, &user.first_name).await?;

        let Some(address) = args.first() else {
            return Ok(vec![Reply::markdown(WALLET_USAGE)]);
        };

        if !is_valid_wallet_address(address) {
            return Ok(vec![Reply::text(WALLET_INVALID)]);
        }

        match self.store.save_wallet(user_id, address).await {
            Ok(()) => {
                debug!(
                    "Wallet address saved for user {} ({}): {}",
                    user.first_name, user.id, address
                );
                Ok(vec![Reply::markdown(format!(
                    "Your wallet address has been saved successfully: `{}`",
                    address
                ))])
            }
            Err(e) => {
                error!("Error saving wallet address: {}", e);
                Ok(vec![Reply::text(WALLET_SAVE_FAILED)])
            }
        }
    }

    #[instrument(skip(self, user), fields(telegram_id = user.id))]
    pub async fn paid(&self, user: &User) -> BotResult<Vec<Reply>> {
        let user_id = self.store.ensure_user(user.id, &user.first_name).await?;

        let Some(wallet) = self.store.wallet(user_id).await? else {
            return Ok(vec![Reply::text(WALLET_REQUIRED)]);
        };

        let signatures = match self
            .verifier
            .matching_signatures(&self.config.operator_wallet, &wallet, self.config.payment_lamports)
            .await
        {
            Ok(signatures) => signatures,
            Err(e) => {
                warn!("Payment lookup failed: {}", e);
                return Ok(vec![Reply::text(PAYMENT_NOT_FOUND)]);
            }
        };

        if signatures.is_empty() {
            debug!("Payment not found.");
            return Ok(vec![Reply::text(PAYMENT_NOT_FOUND)]);
        }

        for signature in &signatures {
            if self.store.is_payment_recorded(signature).await? {
                continue;
            }

            match self
                .store
                .record_payment(user_id, signature, self.config.payment_sol())
                .await
            {
                Ok(()) => {
                    debug!(
                        "Payment verified for user {} ({}). Transaction ID: {}",
                        user.first_name, user.id, signature
                    );
                    return Ok(vec![Reply::text(PAYMENT_VERIFIED)]);
                }
                Err(BotError::PaymentAlreadyUsed { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        error!("Error in /paid: every matching transaction was already used");
        Ok(vec![Reply::text(PAYMENT_USED)])
    }

    pub async fn meme(&self, args: &[String]) -> BotResult<Vec<Reply>> {
        let Some(memes) = &self.memes else {
            return Ok(vec![Reply::text(MEME_DISABLED)]);
        };

        if args.is_empty() {
            return Ok(vec![Reply::text(MEME_USAGE)]);
        }

        let terms = args.join(" ");
        let results = match memes.search(&terms).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Meme search failed: {}", e);
                return Ok(vec![Reply::text(MEME_FAILED)]);
            }
        };

        if results.is_empty() {
            return Ok(vec![Reply::text(format!("No memes found for '{}'.", terms))]);
        }

        let lines: Vec<String> = results
            .iter()
            .map(|meme| format!("{}: {}", meme.description, meme.gif_url))
            .collect();
        Ok(vec![Reply::text(lines.join("\n"))])
    }
}
