pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod memes;
pub mod payments;
pub mod retry;
pub mod store;
pub mod telegram;

pub use agent::{AgentError, AgentReply, Responder, SYSTEM_INSTRUCTION};
pub use config::BotConfig;
pub use dispatcher::Dispatcher;
pub use error::{BotError, BotResult};
pub use handlers::{is_valid_wallet_address, BotHandlers, Reply};
pub use memes::{Meme, TenorClient};
pub use payments::{PaymentVerifier, SolanaVerifier};
pub use retry::RetryPolicy;
pub use store::{HistoryRole, Store, StoredMessage};
pub use telegram::{
    split_message, Chat, Command, Message, ParseMode, TelegramClient, Update, User,
    MAX_MESSAGE_LEN,
};
