//! # triage-api — Binary Entry Point
//!
//! Wires the roster, SMS gateway, supervisor alerts and ledger into a
//! coordinator and serves the HTTP API on `PORT` (default 8080).

use std::sync::Arc;

use anyhow::Context;

use triage_api::db::PgLedger;
use triage_api::state::{AppConfig, AppState};
use triage_dispatch::{Coordinator, DispatchConfig, InMemoryLedger, Ledger, Notifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let dispatch_config = DispatchConfig::from_env().context("reading dispatch configuration")?;
    tracing::info!(?config, ?dispatch_config, "configuration loaded");

    let directory = dispatch_config
        .directory()
        .context("loading technician roster")?;
    let gateway = dispatch_config
        .gateway()
        .context("building SMS gateway")?;
    let alerter = dispatch_config.alerter(Arc::clone(&gateway));
    let notifier = Notifier::new(gateway, dispatch_config.retry);

    let db_pool = triage_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;
    let ledger: Arc<dyn Ledger> = match &db_pool {
        Some(pool) => Arc::new(PgLedger::new(pool.clone())),
        None => Arc::new(InMemoryLedger::new()),
    };

    let coordinator = Coordinator::new(
        ledger,
        Arc::new(directory),
        notifier,
        alerter,
        &dispatch_config,
    );

    let mut state = AppState::new(coordinator.clone(), config.clone());
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }
    let app = triage_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Triage API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.scheduler().shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("TRIAGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
