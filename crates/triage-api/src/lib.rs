//! # triage-api — HTTP Surface for the Dispatch Coordinator
//!
//! ## API Surface
//!
//! | Path                     | Module                  | Auth |
//! |--------------------------|-------------------------|------|
//! | `/dispatch*`             | [`routes::dispatch`]    | yes  |
//! | `/openapi.json`          | [`openapi`]             | yes  |
//! | `/health/*`              | [`routes::health`]      | no   |
//! | `/metrics`               | [`middleware::metrics`] | no   |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## Crate Policy
//!
//! - Every error leaving a handler is an [`error::AppError`].
//! - Request bodies are validated before anything reaches the coordinator.
//! - No `.unwrap()` outside tests.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the application router.
///
/// Health checks and `/metrics` are mounted outside the auth middleware so
/// they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics_on = state.config.metrics_enabled && middleware::metrics::init_metrics().is_some();

    let mut api = Router::new()
        .merge(routes::dispatch::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api.layer(from_fn(middleware::metrics::metrics_middleware));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    let mut unauthenticated = routes::health::router();
    if metrics_on {
        unauthenticated =
            unauthenticated.route("/metrics", axum::routing::get(middleware::metrics::render));
    }
    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}
