use crate::error::{BotError, BotResult};
use model::GeminiConfig;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://user_data.db";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_TENOR_API_URL: &str = "https://g.tenor.com";
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub gemini_api_key: String,
    pub gemini_base_url: Option<String>,
    pub operator_wallet: String,
    pub tenor_api_key: Option<String>,
    pub tenor_api_url: String,
    pub database_url: String,
    pub solana_rpc_url: String,
    pub free_message_limit: i64,
    pub payment_lamports: u64,
    pub poll_timeout: Duration,
    pub history_limit: Option<u32>,
}

impl BotConfig {
    pub fn new(
        telegram_token: impl Into<String>,
        gemini_api_key: impl Into<String>,
        operator_wallet: impl Into<String>,
    ) -> Self {
        Self {
            telegram_token: telegram_token.into(),
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            gemini_api_key: gemini_api_key.into(),
            gemini_base_url: None,
            operator_wallet: operator_wallet.into(),
            tenor_api_key: None,
            tenor_api_url: DEFAULT_TENOR_API_URL.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            solana_rpc_url: DEFAULT_SOLANA_RPC_URL.to_string(),
            free_message_limit: 20,
            payment_lamports: 1_000_000,
            poll_timeout: Duration::from_secs(30),
            history_limit: None,
        }
    }

    /// Reads the process environment, loading `.env` first when present.
    pub fn from_env() -> BotResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| BotError::config(format!("{} must be set", key)))
        };

        let mut config = Self::new(
            require("TOKEN")?,
            require("API_KEY")?,
            require("CRYPTO_WALLET_ADDRESS")?,
        );

        config.tenor_api_key = get("TENOR_API_KEY");
        config.gemini_base_url = get("GEMINI_API_URL");
        if let Some(url) = get("TELEGRAM_API_URL") {
            config.telegram_api_url = url;
        }
        if let Some(url) = get("TENOR_API_URL") {
            config.tenor_api_url = url;
        }
        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(url) = get("SOLANA_RPC_URL") {
            config.solana_rpc_url = url;
        }
        if let Some(limit) = get("FREE_MESSAGE_LIMIT") {
            config.free_message_limit = parse_var("FREE_MESSAGE_LIMIT", &limit)?;
        }
        if let Some(lamports) = get("PAYMENT_LAMPORTS") {
            config.payment_lamports = parse_var("PAYMENT_LAMPORTS", &lamports)?;
        }
        if let Some(secs) = get("POLL_TIMEOUT_SECS") {
            config.poll_timeout = Duration::from_secs(parse_var("POLL_TIMEOUT_SECS", &secs)?);
        }
        if let Some(limit) = get("HISTORY_LIMIT") {
            config.history_limit = Some(parse_var("HISTORY_LIMIT", &limit)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_free_message_limit(mut self, limit: i64) -> Self {
        self.free_message_limit = limit;
        self
    }

    pub fn with_history_limit(mut self, limit: u32) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn with_tenor_api_key(mut self, key: impl Into<String>) -> Self {
        self.tenor_api_key = Some(key.into());
        self
    }

    pub fn payment_sol(&self) -> f64 {
        self.payment_lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    pub fn gemini_config(&self) -> GeminiConfig {
        let config = GeminiConfig::new(self.gemini_api_key.clone());
        match &self.gemini_base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.telegram_token.trim().is_empty() {
            return Err(BotError::config("Telegram token cannot be empty"));
        }

        if self.operator_wallet.trim().is_empty() {
            return Err(BotError::config("Operator wallet cannot be empty"));
        }

        for (name, url) in [
            ("Telegram API URL", &self.telegram_api_url),
            ("Solana RPC URL", &self.solana_rpc_url),
            ("Tenor API URL", &self.tenor_api_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(BotError::config(format!(
                    "{} must start with http:// or https://",
                    name
                )));
            }
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(BotError::config("Database URL must be a sqlite: URL"));
        }

        if self.free_message_limit <= 0 {
            return Err(BotError::config("Free message limit must be greater than 0"));
        }

        if self.payment_lamports == 0 {
            return Err(BotError::config("Payment amount must be greater than 0"));
        }

        if self.poll_timeout.is_zero() {
            return Err(BotError::config("Poll timeout must be greater than 0"));
        }

        if self.history_limit == Some(0) {
            return Err(BotError::config("History limit must be greater than 0"));
        }

        self.gemini_config()
            .validate()
            .map_err(|message| BotError::Config { message })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> BotResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BotError::config(format!("{} has an invalid value: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TOKEN", "123:abc"),
        ("API_KEY", "gemini-key"),
        ("CRYPTO_WALLET_ADDRESS", "OperatorWallet"),
    ];

    #[test]
    fn test_defaults_from_required_vars() {
        let config = BotConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.telegram_token, "123:abc");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.solana_rpc_url, DEFAULT_SOLANA_RPC_URL);
        assert_eq!(config.free_message_limit, 20);
        assert_eq!(config.payment_lamports, 1_000_000);
        assert_eq!(config.payment_sol(), 0.001);
        assert_eq!(config.tenor_api_key, None);
        assert_eq!(config.history_limit, None);
    }

    #[test]
    fn test_missing_required_var() {
        let err = BotConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("CRYPTO_WALLET_ADDRESS"));

        let mut blank = REQUIRED.to_vec();
        blank[0] = ("TOKEN", "  ");
        assert!(BotConfig::from_lookup(lookup(&blank)).is_err());
    }

    #[test]
    fn test_optional_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("TENOR_API_KEY", "tenor"),
            ("FREE_MESSAGE_LIMIT", "5"),
            ("PAYMENT_LAMPORTS", "2500000"),
            ("HISTORY_LIMIT", "40"),
            ("POLL_TIMEOUT_SECS", "10"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("GEMINI_API_URL", "http://localhost:9000"),
        ]);
        let config = BotConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.tenor_api_key.as_deref(), Some("tenor"));
        assert_eq!(config.free_message_limit, 5);
        assert_eq!(config.payment_sol(), 0.0025);
        assert_eq!(config.history_limit, Some(40));
        assert_eq!(config.poll_timeout, Duration::from_secs(10));
        assert_eq!(config.gemini_config().base_url, "http://localhost:9000");
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("FREE_MESSAGE_LIMIT", "lots"),
            ("FREE_MESSAGE_LIMIT", "0"),
            ("PAYMENT_LAMPORTS", "-1"),
            ("HISTORY_LIMIT", "0"),
            ("DATABASE_URL", "postgres://db"),
            ("SOLANA_RPC_URL", "ftp://rpc"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            assert!(
                BotConfig::from_lookup(lookup(&pairs)).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    #[serial]
    fn test_from_env() {
        std::env::set_var("TOKEN", "env-token");
        std::env::set_var("API_KEY", "env-key");
        std::env::set_var("CRYPTO_WALLET_ADDRESS", "env-wallet");
        std::env::set_var("FREE_MESSAGE_LIMIT", "3");

        let config = BotConfig::from_env().unwrap();
        assert_eq!(config.telegram_token, "env-token");
        assert_eq!(config.free_message_limit, 3);

        for key in ["TOKEN", "API_KEY", "CRYPTO_WALLET_ADDRESS", "FREE_MESSAGE_LIMIT"] {
            std::env::remove_var(key);
        }
    }
}
