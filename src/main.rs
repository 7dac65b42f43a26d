use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod logging;
mod proxy;
mod routing;
mod server;
mod store;
mod streaming;
mod transform;
mod types;

use config::{load_config, LoggingConfig};
use proxy::{ModelRouter, RequestDispatcher};
use server::{build_router, AppState};
use store::{MemoryStore, ProviderStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/config.yaml".to_string());
    let config = load_config(&config_path)?;

    init_tracing(&config.logging);
    tracing::info!(path = %config_path, "Configuration loaded");

    let store: Arc<dyn ProviderStore> = Arc::new(MemoryStore::open(&config.store).await?);
    let models = store.list().await?;
    tracing::info!(models = ?models, "Provider store ready");

    let router = Arc::new(ModelRouter::new(
        store,
        &config.cache,
        config.retry.backoff(),
    ));
    let dispatcher = Arc::new(RequestDispatcher::new(&config, router)?);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = build_router(AppState {
        dispatcher,
        config: Arc::new(config),
    });

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("llm_failover_router={},tower_http=info", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
