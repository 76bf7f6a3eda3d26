//! SQLite persistence for users, chat history, wallets and payments.

use crate::error::{BotError, BotResult};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

const MIGRATION_001_INITIAL: &str = include_str!("../migrations/001_initial.sql");

/// Who authored a stored chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Bot,
}

impl HistoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

impl fmt::Display for HistoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRole {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            other => Err(BotError::Database(sqlx::Error::Decode(
                format!("unexpected stored role '{}'", other).into(),
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub text: String,
    pub role: HistoryRole,
    pub timestamp: Option<NaiveDateTime>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> BotResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to database at {}", url);
        Ok(store)
    }

    /// Single-connection in-memory database, every connection of a larger
    /// pool would otherwise see its own empty database.
    pub async fn in_memory() -> BotResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> BotResult<()> {
        debug!("Running migration 001: Initial schema");
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .map_err(|e| BotError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Registers the Telegram user on first contact and returns the internal id.
    #[instrument(skip(self))]
    pub async fn ensure_user(&self, telegram_id: i64, name: &str) -> BotResult<i64> {
        sqlx::query("INSERT OR IGNORE INTO users (telegram_id, name) VALUES (?, ?)")
            .bind(telegram_id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        self.user_id(telegram_id)
            .await?
            .ok_or(BotError::UnknownUser { id: telegram_id })
    }

    pub async fn user_id(&self, telegram_id: i64) -> BotResult<Option<i64>> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE telegram_id = ?")
            .bind(telegram_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn message_count(&self, user_id: i64) -> BotResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT message_count FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BotError::UnknownUser { id: user_id })
    }

    /// Bumps the counter and returns the new value in one statement.
    pub async fn increment_message_count(&self, user_id: i64) -> BotResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET message_count = message_count + 1 WHERE id = ? RETURNING message_count",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BotError::UnknownUser { id: user_id })
    }

    pub async fn reset_message_count(&self, user_id: i64) -> BotResult<()> {
        sqlx::query("UPDATE users SET message_count = 0 WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn store_message(&self, user_id: i64, text: &str, role: HistoryRole) -> BotResult<()> {
        sqlx::query("INSERT INTO messages (user_id, message, role) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(text)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Oldest-first history; `limit` keeps only the most recent turns.
    pub async fn history(&self, user_id: i64, limit: Option<u32>) -> BotResult<Vec<StoredMessage>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT message, role, timestamp FROM (
                SELECT id, message, role, timestamp FROM messages
                WHERE user_id = ?
                ORDER BY id DESC
                LIMIT ?
            ) ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> BotResult<StoredMessage> {
                let role: String = row.try_get("role")?;
                Ok(StoredMessage {
                    text: row.try_get("message")?,
                    role: role.parse()?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    pub async fn wallet(&self, user_id: i64) -> BotResult<Option<String>> {
        let wallet =
            sqlx::query_scalar::<_, String>("SELECT wallet_address FROM wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(wallet)
    }

    pub async fn save_wallet(&self, user_id: i64, address: &str) -> BotResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, wallet_address)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET wallet_address = excluded.wallet_address
            "#,
        )
        .bind(user_id)
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_payment_recorded(&self, signature: &str) -> BotResult<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM payments WHERE transaction_id = ?")
            .bind(signature)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Stores a verified payment and resets the user's quota atomically.
    #[instrument(skip(self))]
    pub async fn record_payment(&self, user_id: i64, signature: &str, sol_amount: f64) -> BotResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payments (user_id, transaction_id, amount, status)
            VALUES (?, ?, ?, 'verified')
            "#,
        )
        .bind(user_id)
        .bind(signature)
        .bind(sol_amount)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            let err = BotError::from(e);
            return Err(if err.is_unique_violation() {
                BotError::PaymentAlreadyUsed {
                    signature: signature.to_string(),
                }
            } else {
                err
            });
        }

        sqlx::query("UPDATE users SET message_count = 0 WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Recorded payment {} for user {}", signature, user_id);
        Ok(())
    }
}
