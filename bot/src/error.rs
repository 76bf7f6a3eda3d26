use model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Telegram API error ({code}): {description}")]
    Telegram { code: i64, description: String },

    #[error("Solana RPC error: {message}")]
    Rpc { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Transaction {signature} was already used for a payment")]
    PaymentAlreadyUsed { signature: String },

    #[error("Unknown user id: {id}")]
    UnknownUser { id: i64 },
}

pub type BotResult<T> = Result<T, BotError>;

impl BotError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True when a SQLite UNIQUE constraint rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            Self::PaymentAlreadyUsed { .. } => true,
            _ => false,
        }
    }
}
