//! # Triage Result
//!
//! Output of the classifier. Derived deterministically from message text
//! and never mutated after creation.

use serde::{Deserialize, Serialize};

use crate::domain::{Category, Priority, ResponseWindow};

/// Classification of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub priority: Priority,
    pub category: Category,
    /// `true` exactly when `priority` is `EMERGENCY`.
    pub dispatch_required: bool,
    pub estimated_response: ResponseWindow,
    /// Which keywords drove the decision.
    pub notes: String,
}

impl TriageResult {
    /// One-line summary used in technician pages and log lines.
    pub fn headline(&self) -> String {
        format!("{} {}", self.priority, self.category)
    }
}
