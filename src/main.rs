//! Smart Door Hub
//!
//! Main entry point for the hub server.

use smartdoor_hub::{
    state::{AppConfig, AppState},
    web_api,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle unlock mailboxes are swept
const MAILBOX_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartdoor_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Smart Door Hub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        upload_url_prefix = %config.upload_url_prefix,
        max_upload_bytes = config.max_upload_bytes,
        database = config.database_url.is_some(),
        heartbeat_sec = config.heartbeat_interval.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::build(config).await?;

    // Forget mailboxes nobody has touched for a while
    let commands = state.commands.clone();
    let idle_ttl = state.config.mailbox_idle_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(MAILBOX_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let pruned = commands.prune_idle(idle_ttl).await;
            if pruned > 0 {
                tracing::debug!(pruned = pruned, "Pruned idle unlock mailboxes");
            }
        }
    });

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
