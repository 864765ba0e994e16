use anyhow::Context as _;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod notifier;
pub mod runtime;
pub mod service;
pub mod store;
#[cfg(test)]
mod testing;

use config::Config;
use controller::Context;
use notifier::{HttpNotifier, NoopNotifier, Notifier, Outbox};
use store::{PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kibaship_operator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kibaship Operator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!(
        base_domain = %config.base_domain,
        profile = %config.resource_profile,
        "Configuration loaded"
    );

    let store = open_store(&config).await?;
    let shutdown = CancellationToken::new();

    // Reconciles only enqueue events; delivery outlives cancelled runs
    let (notifier, delivery) = Outbox::spawn(build_notifier(&config), shutdown.clone());
    let addr = config.bind_addr.clone();
    let ctx = Context::new(store, config, notifier);

    let cancel_on_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping controllers");
        cancel_on_signal.cancel();
    });

    let controllers = controller::spawn_all(&ctx, &shutdown);

    // Build router with all API endpoints
    let app = api::create_router(ctx);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("Server error")?;

    for handle in controllers {
        if let Err(e) = handle.await {
            tracing::error!("Controller task failed: {}", e);
        }
    }

    if let Err(e) = delivery.await {
        tracing::error!("Notification outbox failed: {}", e);
    }

    tracing::info!("Operator shutdown complete");
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Store> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store (state is lost on exit)");
        return Ok(Store::memory());
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database ready");
    Ok(Store::new(Arc::new(PgStore::new(pool))))
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let Some(url) = &config.webhook_url else {
        return Arc::new(NoopNotifier);
    };

    tracing::info!("Delivering lifecycle events to {}", url);
    if config.webhook_secret.is_none() {
        tracing::warn!("KIBASHIP_WEBHOOK_SECRET not set, events are signed with an empty key");
    }
    let key = config.webhook_secret.clone().unwrap_or_default();
    Arc::new(HttpNotifier::new(url.clone(), key))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
