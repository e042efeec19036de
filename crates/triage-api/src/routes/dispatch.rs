//! # Dispatch API
//!
//! Inbound customer messages, technician replies and the dispatch queue.
//!
//! ```text
//! POST /dispatch               classify, log, dispatch on EMERGENCY
//! GET  /dispatch               service descriptor
//! GET  /dispatch/queue         all dispatches, newest first
//! GET  /dispatch/{id}          one dispatch record
//! POST /dispatch/{id}/reply    ACCEPT / DECLINE from a technician
//! ```

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use triage_core::{Category, DispatchId, InboundMessage, MessageSource, TriageResult};
use triage_dispatch::{ReplyVerb, TechnicianReply};
use triage_state::DispatchRecord;

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Service name reported by `GET /dispatch`.
pub const SERVICE_NAME: &str = "emergency-triage-dispatch";

// -- Request / Response DTOs ---------------------------------------------------

/// Inbound customer message.
///
/// Fields default to empty so a missing field surfaces as a 422 with the
/// field name rather than a serde error.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchRequest {
    pub customer_id: String,
    pub message: String,
    pub phone_number: String,
    /// When the message was received upstream. Defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
    /// One of `phone`, `sms`, `whatsapp`, `web`.
    pub source: String,
}

impl Validate for DispatchRequest {
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("customerId", &self.customer_id),
            ("message", &self.message),
            ("phoneNumber", &self.phone_number),
            ("source", &self.source),
        ] {
            if value.trim().is_empty() {
                return Err(format!("missing required field: {name}"));
            }
        }
        if self.customer_id.len() > 255 {
            return Err("customerId must not exceed 255 characters".to_string());
        }
        self.source
            .parse::<MessageSource>()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl DispatchRequest {
    fn into_message(self) -> Result<InboundMessage, AppError> {
        let source = self.source.parse::<MessageSource>()?;
        Ok(InboundMessage::new(
            self.customer_id,
            &self.phone_number,
            self.message,
            source,
            self.timestamp.unwrap_or_else(Utc::now),
        )?)
    }
}

/// Triage summary as returned to the caller.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriageView {
    /// `EMERGENCY`, `URGENT` or `ROUTINE`.
    pub priority: String,
    /// `HVAC`, `PLUMBING`, `ELECTRICAL` or `GENERAL`.
    pub category: String,
    pub dispatch_needed: bool,
    /// e.g. `"15-30 minutes"`.
    pub estimated_response: String,
    pub notes: String,
}

impl From<&TriageResult> for TriageView {
    fn from(t: &TriageResult) -> Self {
        Self {
            priority: t.priority.as_str().to_string(),
            category: t.category.as_str().to_string(),
            dispatch_needed: t.dispatch_required,
            estimated_response: t.estimated_response.to_string(),
            notes: t.notes.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub success: bool,
    pub triage: TriageView,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub dispatch_id: Option<DispatchId>,
}

/// Technician reply to a page.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplyRequest {
    /// Sender phone number.
    pub from: String,
    /// `ACCEPT` or `DECLINE` (case-insensitive).
    pub verb: String,
}

impl Validate for ReplyRequest {
    fn validate(&self) -> Result<(), String> {
        if self.from.trim().is_empty() {
            return Err("missing required field: from".to_string());
        }
        self.verb.parse::<ReplyVerb>().map(|_| ())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub claimed: bool,
    /// Dispatch status after the reply was applied.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub categories: Vec<String>,
}

/// A dispatch record as stored in the ledger.
#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct DispatchView(pub DispatchRecord);

// -- Router ----------------------------------------------------------------------

/// Build the dispatch router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dispatch", post(create_dispatch).get(service_info))
        .route("/dispatch/queue", get(list_queue))
        .route("/dispatch/{id}", get(get_dispatch))
        .route("/dispatch/{id}/reply", post(reply))
}

// -- Handlers --------------------------------------------------------------------

/// POST /dispatch: Triage an inbound message.
#[utoipa::path(
    post,
    path = "/dispatch",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "Message triaged", body = DispatchResponse),
        (status = 400, description = "Malformed JSON", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "dispatch"
)]
pub async fn create_dispatch(
    State(state): State<AppState>,
    body: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Json<DispatchResponse>, AppError> {
    let request = extract_validated_json(body)?;
    let message = request.into_message()?;

    let outcome = state.coordinator.handle(message).await?;
    let text = match outcome.dispatch_id {
        Some(_) => format!(
            "Emergency logged. An on-call technician is being contacted; expected response {}.",
            outcome.triage.estimated_response
        ),
        None => format!(
            "Message logged. Expected response {}.",
            outcome.triage.estimated_response
        ),
    };

    Ok(Json(DispatchResponse {
        success: true,
        triage: TriageView::from(&outcome.triage),
        message: text,
        dispatch_id: outcome.dispatch_id,
    }))
}

/// GET /dispatch: Service descriptor.
#[utoipa::path(
    get,
    path = "/dispatch",
    responses((status = 200, description = "Service status", body = ServiceInfo)),
    tag = "dispatch"
)]
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        status: "operational".to_string(),
        categories: Category::all()
            .iter()
            .map(|c| c.as_str().to_string())
            .collect(),
    })
}

/// GET /dispatch/queue: All dispatches, newest first.
#[utoipa::path(
    get,
    path = "/dispatch/queue",
    responses((status = 200, description = "Dispatch queue", body = Vec<DispatchView>)),
    tag = "dispatch"
)]
pub async fn list_queue(State(state): State<AppState>) -> Result<Json<Vec<DispatchView>>, AppError> {
    let records = state.coordinator.ledger().list_dispatches().await?;
    Ok(Json(records.into_iter().map(DispatchView).collect()))
}

/// GET /dispatch/{id}: One dispatch record.
#[utoipa::path(
    get,
    path = "/dispatch/{id}",
    params(("id" = Uuid, Path, description = "Dispatch ID")),
    responses(
        (status = 200, description = "Dispatch record", body = DispatchView),
        (status = 404, description = "Unknown dispatch", body = crate::error::ErrorBody),
    ),
    tag = "dispatch"
)]
pub async fn get_dispatch(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DispatchView>, AppError> {
    let id = parse_id(id)?;
    let record = state
        .coordinator
        .ledger()
        .get_dispatch(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dispatch {id} not found")))?;
    Ok(Json(DispatchView(record)))
}

/// POST /dispatch/{id}/reply: Technician ACCEPT or DECLINE.
#[utoipa::path(
    post,
    path = "/dispatch/{id}/reply",
    params(("id" = Uuid, Path, description = "Dispatch ID")),
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply applied", body = ReplyResponse),
        (status = 403, description = "Sender is not a rostered technician", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown dispatch", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "dispatch"
)]
pub async fn reply(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReplyRequest>, JsonRejection>,
) -> Result<Json<ReplyResponse>, AppError> {
    let id = parse_id(id)?;
    let request = extract_validated_json(body)?;
    let verb = request.verb.parse::<ReplyVerb>().map_err(AppError::Validation)?;

    let outcome = state
        .coordinator
        .claim(TechnicianReply {
            dispatch_id: id,
            from: request.from,
            verb,
        })
        .await?;

    let record = state
        .coordinator
        .ledger()
        .get_dispatch(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dispatch {id} not found")))?;

    Ok(Json(ReplyResponse {
        claimed: outcome.is_claimed(),
        status: record.status.as_str().to_string(),
        claimed_by: record.claimed_by.map(|t| t.as_str().to_string()),
        message: outcome.message(),
    }))
}

fn parse_id(id: Result<Path<Uuid>, PathRejection>) -> Result<DispatchId, AppError> {
    id.map(|Path(uuid)| DispatchId(uuid))
        .map_err(|e| AppError::BadRequest(e.body_text()))
}
