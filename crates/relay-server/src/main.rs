use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use relay_server::config::{Settings, TransportMode};
use relay_server::handlers::build_router;
use relay_server::services::{
    ConversationStore, OpenRouterClient, ReplyOrchestrator, RetryPolicy, TokioSleeper,
};
use relay_server::state::AppState;
use relay_server::transport::polling::Poller;
use relay_server::transport::TelegramClient;
use relay_server::utils::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before the logger reads RUST_LOG / LOG_FORMAT
    dotenvy::dotenv().ok();
    init_logger()?;

    info!("🚀 Starting relay server...");

    let settings = Settings::load().context("invalid configuration")?;
    info!(
        "✅ Configuration loaded (model={}, mode={:?})",
        settings.completion.model, settings.telegram.mode
    );

    let completion = Arc::new(OpenRouterClient::new(settings.completion.clone())?);
    let telegram = TelegramClient::new(&settings.telegram)?;
    let sleeper = Arc::new(TokioSleeper);

    let orchestrator = Arc::new(ReplyOrchestrator::new(
        ConversationStore::new(settings.history.max_turns),
        completion,
        RetryPolicy::from(&settings.retry),
        sleeper.clone(),
        settings.persona.clone(),
    ));

    let state = AppState::new(
        orchestrator,
        Arc::new(telegram.clone()),
        settings.telegram.api_token.as_str(),
    );

    match settings.telegram.mode {
        TransportMode::Webhook => {
            if let Some(url) = settings.webhook_url() {
                match telegram.set_webhook(&url).await {
                    Ok(()) => info!("✅ Webhook set successfully"),
                    Err(e) => error!("Error setting webhook: {}", e),
                }
            }
        }
        TransportMode::Polling => {
            match telegram.delete_webhook().await {
                Ok(()) => info!("✅ Webhook cleared for long-polling"),
                Err(e) => error!("Error clearing webhook, getUpdates may be rejected: {}", e),
            }

            let poller = Poller::new(
                telegram.clone(),
                state.clone(),
                sleeper,
                settings.telegram.polling_timeout_seconds,
                settings.retry.backoff(),
            );
            tokio::spawn(poller.run());
            info!("✅ Long-polling started");
        }
    }

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
