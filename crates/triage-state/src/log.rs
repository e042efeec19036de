//! # Triage Log
//!
//! Row type of the append-only `triage_log`. Written for every inbound
//! message, dispatched or not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use triage_core::{DispatchId, InboundMessage, TriageEventId, TriageResult};

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageLogEntry {
    pub id: TriageEventId,
    pub message: InboundMessage,
    pub triage: TriageResult,
    /// The dispatch this message produced, if it was an emergency.
    pub dispatch_id: Option<DispatchId>,
    pub logged_at: DateTime<Utc>,
}

impl TriageLogEntry {
    /// Build an entry stamped with a fresh id.
    pub fn new(
        message: InboundMessage,
        triage: TriageResult,
        dispatch_id: Option<DispatchId>,
        logged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TriageEventId::new(),
            message,
            triage,
            dispatch_id,
            logged_at,
        }
    }
}
