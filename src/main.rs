//! Shop bot - Telegram storefront
//!
//! A dialogue state machine that walks users through the catalog, their
//! cart and checkout, backed by an authenticated store API.

mod commerce;
mod config;
mod db;
mod render;
mod runtime;
mod state_machine;
mod telegram;

use commerce::{CredentialManager, HttpTokenIssuer, StoreClient};
use config::BotConfig;
use db::Database;
use runtime::{DatabaseSessionStore, DialogueEngine};
use std::sync::Arc;
use telegram::TelegramTransport;
use teloxide::Bot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine, the environment may already be set
    let _ = dotenv::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shop_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = BotConfig::from_env()?;

    // Initialize database
    tracing::info!(path = %config.session_db_path.display(), "Opening session database");
    let db = Database::open(&config.session_db_path)?;

    // Store backend
    let http = StoreClient::http_client(config.http_timeout)?;
    let issuer = Arc::new(HttpTokenIssuer::new(http.clone(), &config.store_api_url));
    let credentials = Arc::new(CredentialManager::new(
        issuer,
        config.store_client_id.clone(),
        config.token_margin,
    ));

    // Fail fast on a bad client id
    credentials.ensure_fresh().await?;
    tracing::info!(
        api = %config.store_api_url,
        margin_secs = credentials.safety_margin().as_secs(),
        "Store backend ready"
    );

    let store_client = StoreClient::new(http, &config.store_api_url, credentials);

    // Telegram
    let bot = Bot::new(&config.telegram_token);
    let engine = Arc::new(DialogueEngine::new(
        DatabaseSessionStore::new(db),
        store_client,
        TelegramTransport::new(bot.clone()),
    ));

    telegram::run_polling(bot, engine).await;

    Ok(())
}
