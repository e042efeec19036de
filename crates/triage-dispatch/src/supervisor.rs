//! # Supervisor Alerts
//!
//! Out-of-band notification that a dispatch could not be staffed. Alerts
//! are best-effort: delivery failures are logged and never surface to the
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use triage_core::DispatchId;
use triage_state::DispatchRecord;

use crate::notifier::{send_with_retry, RetryPolicy, SmsGateway};

/// Why a supervisor is being alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertReason {
    /// Nobody was on call for the category when the dispatch was created.
    NoTechnicianAvailable,
    /// Every eligible technician was paged and none claimed.
    CandidatesExhausted { attempts: u32 },
}

impl std::fmt::Display for AlertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTechnicianAvailable => f.write_str("no on-call technician available"),
            Self::CandidatesExhausted { attempts } => {
                write!(f, "no claim after {attempts} technician(s) paged")
            }
        }
    }
}

/// An unstaffed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorAlert {
    pub dispatch_id: DispatchId,
    pub headline: String,
    pub customer_phone: String,
    pub reason: AlertReason,
}

impl SupervisorAlert {
    pub fn for_record(record: &DispatchRecord, reason: AlertReason) -> Self {
        Self {
            dispatch_id: record.id,
            headline: record.triage.headline(),
            customer_phone: record.customer_phone.clone(),
            reason,
        }
    }

    /// SMS text sent to the supervisor.
    pub fn body(&self) -> String {
        format!(
            "[SUPERVISOR] {} dispatch {} unstaffed: {}. Customer: {}.",
            self.headline, self.dispatch_id, self.reason, self.customer_phone
        )
    }
}

#[async_trait]
pub trait SupervisorAlerter: Send + Sync + 'static {
    async fn alert(&self, alert: &SupervisorAlert);
}

/// Alerts by logging at ERROR.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlerter;

#[async_trait]
impl SupervisorAlerter for TracingAlerter {
    async fn alert(&self, alert: &SupervisorAlert) {
        tracing::error!(
            dispatch_id = %alert.dispatch_id,
            customer_phone = %alert.customer_phone,
            reason = %alert.reason,
            "SUPERVISOR ALERT: {} dispatch unstaffed",
            alert.headline
        );
    }
}

/// Alerts by paging a supervisor phone. Also logs like [`TracingAlerter`].
#[derive(Clone)]
pub struct SmsAlerter {
    gateway: Arc<dyn SmsGateway>,
    policy: RetryPolicy,
    phone: String,
}

impl std::fmt::Debug for SmsAlerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmsAlerter")
            .field("phone", &self.phone)
            .finish_non_exhaustive()
    }
}

impl SmsAlerter {
    pub fn new(gateway: Arc<dyn SmsGateway>, policy: RetryPolicy, phone: impl Into<String>) -> Self {
        Self {
            gateway,
            policy,
            phone: phone.into(),
        }
    }
}

#[async_trait]
impl SupervisorAlerter for SmsAlerter {
    async fn alert(&self, alert: &SupervisorAlert) {
        TracingAlerter.alert(alert).await;
        if let Err(e) =
            send_with_retry(self.gateway.as_ref(), &self.phone, &alert.body(), &self.policy).await
        {
            tracing::warn!(
                dispatch_id = %alert.dispatch_id,
                error = %e,
                "supervisor SMS failed"
            );
        }
    }
}
