//! Storefront API server

use std::sync::Arc;

use anyhow::Result;
use storefront::{
    api::{self, AppState},
    auth::SessionKeys,
    config::AppConfig,
    messaging::{LogBus, NatsBus},
    services::{CartService, Outbox, Services, Settings},
    store::{MemoryStore, PgStore, Store},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &cfg.database_url {
        Some(url) => Arc::new(PgStore::connect(url, cfg.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let outbox = match &cfg.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => {
                let bus = Arc::new(NatsBus::new(client, cfg.event_subject_prefix.clone(), cfg.notification_subject.clone()));
                Outbox::new(bus.clone(), bus)
            }
            Err(err) => {
                tracing::warn!(error = %err, "NATS unavailable; events and emails will only be logged");
                Outbox::new(Arc::new(LogBus), Arc::new(LogBus))
            }
        },
        None => Outbox::logging(),
    };

    let keys = SessionKeys::new(cfg.session_secret.as_bytes(), cfg.admin_token_ttl, cfg.user_token_ttl);
    let backend = store.backend();
    let services = Services::new(store, outbox, keys.clone(), Settings::from(&cfg));
    tokio::spawn(sweep_carts(services.carts.clone(), cfg.clone()));

    let app = api::router(AppState { services, keys, backend });
    let addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%addr, store = backend, "storefront listening");
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Purges idle carts on a fixed interval.
async fn sweep_carts(carts: CartService, cfg: AppConfig) {
    let mut ticker = tokio::time::interval(cfg.cart_sweep_interval);
    loop {
        ticker.tick().await;
        if let Err(err) = carts.purge_expired(cfg.cart_ttl).await {
            tracing::warn!(error = %err, "cart sweep failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
