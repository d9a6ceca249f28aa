//! Order Integration - seller order intake and settlement service

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_integration::{
    api::{router, AppState},
    config::AppConfig,
    notify::{LogNotifier, NatsNotifier},
    ports::{Notifier, Ports},
    store::{MemoryStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = AppConfig::from_env()?;
    let clock = config.clock().context("ORG_UTC_OFFSET_HOURS out of range")?;

    let notifier: Arc<dyn Notifier> = match config.nats_url.as_deref() {
        Some(url) => match NatsNotifier::connect(url, config.nats_subject.clone(), config.nats_events_prefix.clone()).await {
            Ok(nats) => Arc::new(nats),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let ports = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections).await?;
            sqlx::migrate!("./migrations").run(store.pool()).await?;
            Ports::from_store(Arc::new(store), notifier)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Ports::from_store(Arc::new(MemoryStore::new()), notifier)
        }
    };

    let app = router(AppState::new(ports, clock, config.fuzzy_top_n).with_sessions(config.session_store()));

    tracing::info!("🚀 Order Integration listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
