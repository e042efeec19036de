//! # OpenAPI Document Assembly
//!
//! Collects the utoipa-documented dispatch routes into one OpenAPI 3.1
//! document served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Static bearer token. Set via TRIAGE_AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Triage API",
        version = "0.1.0",
        description = "Emergency triage and on-call dispatch.\n\nInbound customer messages are classified by priority and trade category. Emergencies create a dispatch record and page the on-call technician, escalating down the roster when a claim deadline passes.\n\nAll `/dispatch*` endpoints require `Authorization: Bearer <token>` when a token is configured. Health checks and `/metrics` are unauthenticated.",
        license(name = "AGPL-3.0-or-later"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        crate::routes::dispatch::create_dispatch,
        crate::routes::dispatch::service_info,
        crate::routes::dispatch::list_queue,
        crate::routes::dispatch::get_dispatch,
        crate::routes::dispatch::reply,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::dispatch::DispatchRequest,
            crate::routes::dispatch::DispatchResponse,
            crate::routes::dispatch::TriageView,
            crate::routes::dispatch::ReplyRequest,
            crate::routes::dispatch::ReplyResponse,
            crate::routes::dispatch::ServiceInfo,
            crate::routes::dispatch::DispatchView,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "dispatch", description = "Message triage, technician paging and claims"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_generates() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "Triage API");
    }

    #[test]
    fn document_has_dispatch_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/dispatch",
            "/dispatch/queue",
            "/dispatch/{id}",
            "/dispatch/{id}/reply",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn document_declares_bearer_auth() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn dispatch_view_is_an_object_schema() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().expect("components");
        assert!(components.schemas.contains_key("DispatchView"));

        let json = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(json["components"]["schemas"]["DispatchView"]["type"], "object");
        let queue = &json["paths"]["/dispatch/queue"]["get"]["responses"]["200"];
        assert!(queue.to_string().contains("DispatchView"), "{queue}");
    }
}
