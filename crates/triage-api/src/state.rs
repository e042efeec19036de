//! # Application State
//!
//! Shared state for the Axum application: the dispatch coordinator, the
//! optional database pool, and configuration.

use sqlx::PgPool;

use triage_dispatch::Coordinator;

/// HTTP server configuration.
///
/// Custom `Debug` redacts the auth token.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token for `/dispatch*`. If `None`, authentication is
    /// disabled.
    pub auth_token: Option<String>,
    /// Install the Prometheus recorder and mount `/metrics`.
    pub metrics_enabled: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("metrics_enabled", &self.metrics_enabled)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Read `PORT`, `TRIAGE_AUTH_TOKEN` and `TRIAGE_METRICS_ENABLED`.
    ///
    /// An unparseable port falls back to 8080. Metrics stay enabled unless
    /// the variable is exactly `false` (case-insensitive).
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let auth_token = std::env::var("TRIAGE_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        let metrics_enabled = std::env::var("TRIAGE_METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);
        Self {
            port,
            auth_token,
            metrics_enabled,
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    /// Present when the ledger is Postgres-backed; pinged by readiness.
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(coordinator: Coordinator, config: AppConfig) -> Self {
        Self {
            coordinator,
            db_pool: None,
            config,
        }
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}
