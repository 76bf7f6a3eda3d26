use bot::{
    BotConfig, BotHandlers, Dispatcher, PaymentVerifier, Responder, SolanaVerifier, Store,
    TelegramClient, TenorClient,
};
use clap::{Parser, Subcommand};
use model::prelude::*;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "pay-chat-bot")]
#[command(about = "Telegram companion bot with pay-per-chat quotas")]
struct Cli {
    /// Override DATABASE_URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (long polling)
    Run {
        /// Free messages per paid period, overrides FREE_MESSAGE_LIMIT
        #[arg(long)]
        free_messages: Option<i64>,
    },
    /// Check the Gemini and Telegram credentials
    Health,
    /// List available Gemini models
    Models,
    /// Look up payments from a sender wallet to the operator wallet
    Verify {
        /// Sender wallet address
        #[arg(short, long)]
        sender: String,
    },
    /// Print the stored conversation of a Telegram user
    History {
        /// Telegram user id
        #[arg(short, long)]
        telegram_id: i64,
        /// Only show the most recent turns
        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = BotConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config = config.with_database_url(url);
    }

    match cli.command {
        Commands::Run { free_messages } => {
            if let Some(limit) = free_messages {
                config = config.with_free_message_limit(limit);
            }
            config.validate()?;
            run_bot(config).await?;
        }
        Commands::Health => {
            health_check(&config).await?;
        }
        Commands::Models => {
            list_models(&config).await?;
        }
        Commands::Verify { sender } => {
            verify_payment(&config, &sender).await?;
        }
        Commands::History { telegram_id, limit } => {
            show_history(&config, telegram_id, limit).await?;
        }
    }

    Ok(())
}

async fn run_bot(config: BotConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::connect(&config.database_url).await?;
    let provider = GeminiProvider::new(config.gemini_config())?;
    let responder = Responder::new(Arc::new(provider));
    let verifier: Arc<dyn PaymentVerifier> = Arc::new(SolanaVerifier::new(&config.solana_rpc_url)?);
    let telegram = TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_token,
        config.poll_timeout,
    )?;

    let me = telegram.get_me().await?;
    info!("Authorized as {} ({})", me.first_name, me.id);

    let mut handlers = BotHandlers::new(store, responder, verifier, config.clone());
    if let Some(key) = &config.tenor_api_key {
        handlers = handlers.with_memes(TenorClient::new(&config.tenor_api_url, key)?);
    }
    if let Some(username) = me.username {
        handlers = handlers.with_bot_username(username);
    }

    let mut dispatcher = Dispatcher::new(telegram, Arc::new(handlers), config.poll_timeout);
    dispatcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn health_check(config: &BotConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Performing health check...");

    let provider = GeminiProvider::new(config.gemini_config())?;
    match provider.health_check().await {
        Ok(()) => {
            println!("✓ Gemini is reachable and {} is available.", provider.default_model());
            info!("Gemini health check successful");
        }
        Err(e) => {
            println!("✗ Gemini health check failed: {}", e);
            error!("Gemini health check failed: {}", e);
            return Err(e.into());
        }
    }

    let telegram = TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_token,
        config.poll_timeout,
    )?;
    match telegram.get_me().await {
        Ok(me) => {
            println!(
                "✓ Telegram token is valid (@{}).",
                me.username.unwrap_or(me.first_name)
            );
        }
        Err(e) => {
            println!("✗ Telegram health check failed: {}", e);
            error!("Telegram health check failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn list_models(config: &BotConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Available models:");
    let provider = GeminiProvider::new(config.gemini_config())?;
    let models = provider.list_models().await?;

    if models.is_empty() {
        println!("  No models found. Check that the API key has Gemini access.");
    } else {
        for model in models {
            println!(
                "  - {} ({})",
                model.name,
                model
                    .input_token_limit
                    .map(|t| format!("{} input tokens", t))
                    .unwrap_or_else(|| "unknown context".to_string())
            );
        }
    }

    Ok(())
}

async fn verify_payment(config: &BotConfig, sender: &str) -> Result<(), Box<dyn std::error::Error>> {
    let verifier = SolanaVerifier::new(&config.solana_rpc_url)?;
    let signatures = verifier
        .matching_signatures(&config.operator_wallet, sender, config.payment_lamports)
        .await?;

    if signatures.is_empty() {
        println!(
            "No transfers of {} SOL from {} to {} found.",
            config.payment_sol(),
            sender,
            config.operator_wallet
        );
        return Ok(());
    }

    let store = Store::connect(&config.database_url).await?;
    for signature in signatures {
        let used = store.is_payment_recorded(&signature).await?;
        println!("  {} {}", signature, if used { "(already used)" } else { "(unused)" });
    }

    Ok(())
}

async fn show_history(
    config: &BotConfig,
    telegram_id: i64,
    limit: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::connect(&config.database_url).await?;
    let Some(user_id) = store.user_id(telegram_id).await? else {
        println!("No user with Telegram id {}.", telegram_id);
        return Ok(());
    };

    println!(
        "Messages used this period: {}/{}",
        store.message_count(user_id).await?,
        config.free_message_limit
    );
    for turn in store.history(user_id, limit).await? {
        let when = turn
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!("[{}] {}: {}", when, turn.role, turn.text);
    }

    Ok(())
}
