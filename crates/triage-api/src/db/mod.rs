//! # Database Persistence Layer
//!
//! Optional PostgreSQL ledger via SQLx. When `DATABASE_URL` is set, triage
//! events and dispatch records survive restarts; when absent, the server
//! uses the in-memory ledger.
//!
//! Tables: `triage_log` (append-only) and `dispatch_queue` (one mutable row
//! per dispatch). The technician roster is not stored here.

pub mod ledger;

pub use ledger::PgLedger;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, using the in-memory ledger. \
                 Dispatches will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
