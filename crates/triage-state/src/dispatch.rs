//! # Dispatch Records
//!
//! Runtime-checked transitions for [`DispatchRecord`]. Ledgers call these
//! under their per-record lock (in memory) or mirror them as conditional
//! `UPDATE`s (Postgres); a rejected transition is how a lost race surfaces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use triage_core::{CustomerId, DispatchId, TechnicianId, TriageResult};

/// Lifecycle status of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    /// A technician has been paged and the claim deadline is running.
    Pending,
    /// A technician accepted. Terminal.
    Claimed,
    /// The deadline passed and the next technician is being selected.
    Escalated,
    /// No technician claimed and none remain. Terminal.
    Expired,
}

impl DispatchStatus {
    /// Returns the canonical state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Claimed => "CLAIMED",
            Self::Escalated => "ESCALATED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Claimed | Self::Expired)
    }

    /// Whether `self → to` is an edge of the state machine.
    pub fn can_transition_to(&self, to: DispatchStatus) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Claimed)
                | (Self::Pending, Self::Escalated)
                | (Self::Pending, Self::Expired)
                | (Self::Escalated, Self::Pending)
        )
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CLAIMED" => Ok(Self::Claimed),
            "ESCALATED" => Ok(Self::Escalated),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(format!("unknown dispatch status: {other}")),
        }
    }
}

/// One status change, appended to the record's transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: DispatchStatus,
    pub to: DispatchStatus,
    pub at: DateTime<Utc>,
    /// Technician the transition concerns (claimer, or next paged).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<TechnicianId>,
    pub reason: String,
}

/// A transition the state machine refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The record is no longer `PENDING`.
    #[error("dispatch {id} is {status}, not PENDING")]
    NotPending {
        id: DispatchId,
        status: DispatchStatus,
    },

    /// The record was already claimed.
    #[error("dispatch {id} already claimed by {by}")]
    AlreadyClaimed { id: DispatchId, by: TechnicianId },

    /// The caller's view of the attempt counter is out of date.
    #[error("dispatch {id} is at attempt {actual}, caller expected {expected}")]
    StaleAttempt {
        id: DispatchId,
        expected: u32,
        actual: u32,
    },

    /// The technician was already paged for this dispatch.
    #[error("technician {technician} already paged for dispatch {id}")]
    DuplicateCandidate {
        id: DispatchId,
        technician: TechnicianId,
    },

    /// The edge does not exist in the state machine.
    #[error("invalid dispatch transition: {from} -> {to}")]
    InvalidTransition {
        from: DispatchStatus,
        to: DispatchStatus,
    },
}

/// Parameters for re-paging the next technician.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationStep {
    /// Attempt number the caller's timer was armed for.
    pub expected_attempt: u32,
    pub next_technician: TechnicianId,
    pub notified_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    /// Why the current technician is being passed over.
    pub reason: String,
}

/// Everything known about a dispatch before a technician is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDispatch {
    pub id: DispatchId,
    pub customer_id: CustomerId,
    pub customer_phone: String,
    pub summary: String,
    pub triage: TriageResult,
    pub created_at: DateTime<Utc>,
}

/// A row of the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRecord {
    pub id: DispatchId,
    pub customer_id: CustomerId,
    pub customer_phone: String,
    /// Short description of the problem, quoted in technician pages.
    pub summary: String,
    pub triage: TriageResult,
    /// Technicians paged so far, in paging order.
    pub candidate_technicians: Vec<TechnicianId>,
    pub claimed_by: Option<TechnicianId>,
    pub status: DispatchStatus,
    /// Number of technicians paged. Zero only for unstaffed dispatches.
    pub attempt: u32,
    pub notified_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub transition_log: Vec<TransitionRecord>,
}

impl DispatchRecord {
    /// A new `PENDING` dispatch with `first` already paged.
    pub fn pending(
        seed: NewDispatch,
        first: TechnicianId,
        deadline_at: DateTime<Utc>,
    ) -> Self {
        let now = seed.created_at;
        let mut record = Self::from_seed(seed);
        record.candidate_technicians.push(first);
        record.attempt = 1;
        record.notified_at = Some(now);
        record.deadline_at = Some(deadline_at);
        record
    }

    /// A `PENDING` dispatch with nobody to page. The coordinator expires
    /// it immediately; it exists so the event is on the audit trail.
    pub fn unstaffed(seed: NewDispatch) -> Self {
        Self::from_seed(seed)
    }

    fn from_seed(seed: NewDispatch) -> Self {
        Self {
            id: seed.id,
            customer_id: seed.customer_id,
            customer_phone: seed.customer_phone,
            summary: seed.summary,
            triage: seed.triage,
            candidate_technicians: Vec::new(),
            claimed_by: None,
            status: DispatchStatus::Pending,
            attempt: 0,
            notified_at: None,
            deadline_at: None,
            created_at: seed.created_at,
            updated_at: seed.created_at,
            resolved_at: None,
            transition_log: Vec::new(),
        }
    }

    /// The technician most recently paged.
    pub fn current_technician(&self) -> Option<&TechnicianId> {
        self.candidate_technicians.last()
    }

    /// Whether `technician` has been paged for this dispatch.
    pub fn was_notified(&self, technician: &TechnicianId) -> bool {
        self.candidate_technicians.contains(technician)
    }

    /// Whether the record is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record `technician` as the claimer (`PENDING → CLAIMED`).
    ///
    /// Succeeds only if the record is `PENDING` and unclaimed.
    pub fn claim(
        &mut self,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if let Some(by) = &self.claimed_by {
            return Err(TransitionError::AlreadyClaimed {
                id: self.id,
                by: by.clone(),
            });
        }
        self.require_pending()?;
        self.transition(
            DispatchStatus::Claimed,
            at,
            Some(technician.clone()),
            "technician accepted",
        )?;
        self.claimed_by = Some(technician.clone());
        self.resolved_at = Some(at);
        Ok(())
    }

    /// Page the next technician (`PENDING → ESCALATED → PENDING`).
    ///
    /// Increments `attempt`, appends the technician to the candidate list
    /// and moves the deadline.
    pub fn escalate(&mut self, step: &EscalationStep) -> Result<(), TransitionError> {
        self.require_pending()?;
        self.require_attempt(step.expected_attempt)?;
        if self.was_notified(&step.next_technician) {
            return Err(TransitionError::DuplicateCandidate {
                id: self.id,
                technician: step.next_technician.clone(),
            });
        }
        self.transition(
            DispatchStatus::Escalated,
            step.notified_at,
            self.current_technician().cloned(),
            step.reason.clone(),
        )?;
        self.transition(
            DispatchStatus::Pending,
            step.notified_at,
            Some(step.next_technician.clone()),
            "re-armed for next technician",
        )?;
        self.candidate_technicians.push(step.next_technician.clone());
        self.attempt += 1;
        self.notified_at = Some(step.notified_at);
        self.deadline_at = Some(step.deadline_at);
        Ok(())
    }

    /// Give up on the dispatch (`PENDING → EXPIRED`).
    pub fn expire(
        &mut self,
        expected_attempt: u32,
        at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.require_pending()?;
        self.require_attempt(expected_attempt)?;
        self.transition(DispatchStatus::Expired, at, None, reason)?;
        self.deadline_at = None;
        self.resolved_at = Some(at);
        Ok(())
    }

    fn require_pending(&self) -> Result<(), TransitionError> {
        if self.status == DispatchStatus::Pending {
            Ok(())
        } else {
            Err(TransitionError::NotPending {
                id: self.id,
                status: self.status,
            })
        }
    }

    fn require_attempt(&self, expected: u32) -> Result<(), TransitionError> {
        if self.attempt == expected {
            Ok(())
        } else {
            Err(TransitionError::StaleAttempt {
                id: self.id,
                expected,
                actual: self.attempt,
            })
        }
    }

    fn transition(
        &mut self,
        to: DispatchStatus,
        at: DateTime<Utc>,
        technician_id: Option<TechnicianId>,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.transition_log.push(TransitionRecord {
            from: self.status,
            to,
            at,
            technician_id,
            reason: reason.into(),
        });
        self.status = to;
        self.updated_at = at;
        Ok(())
    }
}
