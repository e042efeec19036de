//! # Dispatch Coordinator
//!
//! Orchestration only. The coordinator holds no dispatch state of its own:
//! every decision re-reads the ledger and every mutation is a ledger CAS.
//!
//! ```text
//! handle():  classify → log_triage → [dispatch()]
//! dispatch(): pick_on_call → create_dispatch → page → arm
//! claim():   find_by_phone → try_claim → cancel
//! deadline:  escalate → page → re-arm   |   expire → alert
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use triage_classifier::classify;
use triage_core::{
    DispatchId, InboundMessage, Technician, TechnicianId, TriageEventId, TriageResult,
};
use triage_state::{DispatchRecord, DispatchStatus, EscalationStep, NewDispatch, TriageLogEntry};

use crate::config::DispatchConfig;
use crate::directory::Directory;
use crate::escalation::EscalationScheduler;
use crate::ledger::{Ledger, LedgerError};
use crate::notifier::{Notifier, ReplyVerb, TechnicianReply};
use crate::supervisor::{AlertReason, SupervisorAlert, SupervisorAlerter};

/// Longest problem summary quoted in a page.
const SUMMARY_MAX_CHARS: usize = 120;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch {0} not found")]
    NotFound(DispatchId),

    #[error("sender {0} is not a rostered technician")]
    UnknownSender(String),

    #[error(transparent)]
    Ledger(LedgerError),
}

impl From<LedgerError> for DispatchError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound(id) => Self::NotFound(id),
            other => Self::Ledger(other),
        }
    }
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleOutcome {
    pub triage_event: TriageEventId,
    pub triage: TriageResult,
    pub dispatch_id: Option<DispatchId>,
}

/// What a technician reply achieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimOutcome {
    /// This reply won the claim.
    Claimed { by: TechnicianId },
    /// Someone else (or this technician, earlier) already holds it.
    AlreadyClaimed { by: TechnicianId },
    /// The dispatch expired before the reply arrived.
    NotPending { status: DispatchStatus },
    /// The sender was never paged for this dispatch.
    NotNotified,
    /// The decline was recorded.
    Declined,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed { .. })
    }

    /// Acknowledgment text returned to the technician.
    pub fn message(&self) -> String {
        match self {
            Self::Claimed { .. } => "Dispatch claimed. Customer details follow.".to_string(),
            Self::AlreadyClaimed { by } => format!("Dispatch already claimed by {by}."),
            Self::NotPending { status } => format!("Dispatch is {status} and can no longer be claimed."),
            Self::NotNotified => "You were not paged for this dispatch.".to_string(),
            Self::Declined => "Decline recorded.".to_string(),
        }
    }
}

struct Inner {
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn Directory>,
    notifier: Notifier,
    scheduler: EscalationScheduler,
    alerter: Arc<dyn SupervisorAlerter>,
    claim_timeout: Duration,
    deadline_offset: chrono::Duration,
    max_attempts: Option<u32>,
}

/// Cheaply cloneable handle to the dispatch pipeline.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("claim_timeout", &self.inner.claim_timeout)
            .field("max_attempts", &self.inner.max_attempts)
            .field("armed_timers", &self.inner.scheduler.pending())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn Directory>,
        notifier: Notifier,
        alerter: Arc<dyn SupervisorAlerter>,
        config: &DispatchConfig,
    ) -> Self {
        let deadline_offset = chrono::Duration::from_std(config.claim_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        Self {
            inner: Arc::new(Inner {
                ledger,
                directory,
                notifier,
                scheduler: EscalationScheduler::new(),
                alerter,
                claim_timeout: config.claim_timeout,
                deadline_offset,
                max_attempts: config.max_attempts,
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.inner.ledger
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.inner.directory
    }

    pub fn scheduler(&self) -> &EscalationScheduler {
        &self.inner.scheduler
    }

    /// Classify and log an inbound message, dispatching if it is an
    /// emergency.
    pub async fn handle(&self, message: InboundMessage) -> Result<HandleOutcome, DispatchError> {
        let triage = classify(&message.text);
        metrics::counter!("triage_messages_total", "priority" => triage.priority.as_str())
            .increment(1);

        let dispatch_id = triage.dispatch_required.then(DispatchId::new);
        let entry = TriageLogEntry::new(message.clone(), triage.clone(), dispatch_id, Utc::now());
        let triage_event = entry.id;
        self.inner.ledger.log_triage(entry).await?;

        tracing::info!(
            triage_event = %triage_event,
            customer_id = %message.customer_id,
            source = %message.source,
            priority = %triage.priority,
            category = %triage.category,
            dispatch_required = triage.dispatch_required,
            "message triaged"
        );

        if let Some(id) = dispatch_id {
            self.dispatch(NewDispatch {
                id,
                customer_id: message.customer_id,
                customer_phone: message.phone_number,
                summary: summarize(&message.text),
                triage: triage.clone(),
                created_at: Utc::now(),
            })
            .await?;
        }

        Ok(HandleOutcome {
            triage_event,
            triage,
            dispatch_id,
        })
    }

    /// Record a dispatch and page the first on-call technician.
    ///
    /// With nobody on call the dispatch is recorded, expired at once and
    /// a supervisor alert is raised.
    pub async fn dispatch(&self, seed: NewDispatch) -> Result<DispatchId, DispatchError> {
        let id = seed.id;
        let category = seed.triage.category;

        let Some(technician) = self.inner.directory.pick_on_call(category, &BTreeSet::new())
        else {
            let record = DispatchRecord::unstaffed(seed);
            self.inner.ledger.create_dispatch(record.clone()).await?;
            metrics::counter!("triage_dispatches_created_total").increment(1);
            if self
                .inner
                .ledger
                .expire(id, 0, Utc::now(), "no on-call technician")
                .await?
            {
                metrics::counter!("triage_dispatches_expired_total").increment(1);
            }
            tracing::warn!(dispatch_id = %id, category = %category, "no on-call technician");
            self.raise_alert(&record, AlertReason::NoTechnicianAvailable);
            return Ok(id);
        };

        let deadline_at = seed.created_at + self.inner.deadline_offset;
        let record = DispatchRecord::pending(seed, technician.id.clone(), deadline_at);
        self.inner.ledger.create_dispatch(record.clone()).await?;
        metrics::counter!("triage_dispatches_created_total").increment(1);
        tracing::info!(
            dispatch_id = %id,
            technician_id = %technician.id,
            attempt = 1,
            "dispatch created"
        );

        self.page_and_arm(&technician, &record, 1);
        Ok(id)
    }

    /// Apply a technician reply.
    pub async fn claim(&self, reply: TechnicianReply) -> Result<ClaimOutcome, DispatchError> {
        let id = reply.dispatch_id;
        let technician = self
            .inner
            .directory
            .find_by_phone(&reply.from)
            .ok_or_else(|| DispatchError::UnknownSender(reply.from.clone()))?;
        let record = self.load(id).await?;

        if !record.was_notified(&technician.id) {
            tracing::info!(
                dispatch_id = %id,
                technician_id = %technician.id,
                verb = %reply.verb,
                "reply from technician who was not paged"
            );
            return Ok(ClaimOutcome::NotNotified);
        }

        match reply.verb {
            ReplyVerb::Accept => self.accept(id, &technician).await,
            ReplyVerb::Decline => self.decline(record, &technician).await,
        }
    }

    /// Timer callback for `attempt` of dispatch `id`.
    pub async fn on_deadline(&self, id: DispatchId, attempt: u32) -> Result<(), DispatchError> {
        self.advance(id, attempt, "claim deadline passed").await
    }

    /// Number of armed escalation timers.
    pub fn pending_timers(&self) -> usize {
        self.inner.scheduler.pending()
    }

    async fn accept(
        &self,
        id: DispatchId,
        technician: &Technician,
    ) -> Result<ClaimOutcome, DispatchError> {
        if self
            .inner
            .ledger
            .try_claim(id, &technician.id, Utc::now())
            .await?
        {
            self.inner.scheduler.cancel(id);
            metrics::counter!("triage_dispatches_claimed_total").increment(1);
            tracing::info!(dispatch_id = %id, technician_id = %technician.id, "dispatch claimed");
            return Ok(ClaimOutcome::Claimed {
                by: technician.id.clone(),
            });
        }

        let current = self.load(id).await?;
        tracing::info!(
            dispatch_id = %id,
            technician_id = %technician.id,
            status = %current.status,
            "claim lost"
        );
        Ok(Self::not_claimable(current))
    }

    async fn decline(
        &self,
        record: DispatchRecord,
        technician: &Technician,
    ) -> Result<ClaimOutcome, DispatchError> {
        if record.status != DispatchStatus::Pending {
            return Ok(Self::not_claimable(record));
        }
        metrics::counter!("triage_replies_declined_total").increment(1);
        if record.current_technician() != Some(&technician.id) {
            tracing::info!(
                dispatch_id = %record.id,
                technician_id = %technician.id,
                "decline from a previously paged technician"
            );
            return Ok(ClaimOutcome::Declined);
        }
        tracing::info!(
            dispatch_id = %record.id,
            technician_id = %technician.id,
            attempt = record.attempt,
            "technician declined, escalating"
        );
        self.advance(record.id, record.attempt, "declined by technician")
            .await?;
        Ok(ClaimOutcome::Declined)
    }

    /// Escalate to the next technician, or expire if none remain.
    ///
    /// No-op unless the dispatch is still `PENDING` at `expected_attempt`.
    /// The next technician is only paged if the record is still `PENDING`
    /// at the new attempt after the escalation CAS. A claim landing after
    /// that re-read can still leave one page and one timer behind; the
    /// timer then finds the record claimed and does nothing.
    async fn advance(
        &self,
        id: DispatchId,
        expected_attempt: u32,
        reason: &str,
    ) -> Result<(), DispatchError> {
        let record = self.load(id).await?;
        if record.status != DispatchStatus::Pending || record.attempt != expected_attempt {
            tracing::debug!(
                dispatch_id = %id,
                expected_attempt,
                attempt = record.attempt,
                status = %record.status,
                "superseded escalation ignored"
            );
            return Ok(());
        }

        let capped = self
            .inner
            .max_attempts
            .is_some_and(|max| record.attempt >= max);
        let excluding: BTreeSet<TechnicianId> =
            record.candidate_technicians.iter().cloned().collect();
        let next = if capped {
            None
        } else {
            self.inner
                .directory
                .pick_on_call(record.triage.category, &excluding)
        };

        match next {
            Some(technician) => {
                let now = Utc::now();
                let step = EscalationStep {
                    expected_attempt,
                    next_technician: technician.id.clone(),
                    notified_at: now,
                    deadline_at: now + self.inner.deadline_offset,
                    reason: reason.to_string(),
                };
                if self.inner.ledger.escalate(id, &step).await? {
                    let attempt = expected_attempt + 1;
                    metrics::counter!("triage_dispatches_escalated_total").increment(1);
                    tracing::info!(
                        dispatch_id = %id,
                        technician_id = %technician.id,
                        attempt,
                        reason,
                        "dispatch escalated"
                    );
                    // An earlier candidate may have claimed since the CAS.
                    let current = self.load(id).await?;
                    if current.status == DispatchStatus::Pending && current.attempt == attempt {
                        self.page_and_arm(&technician, &current, attempt);
                    } else {
                        tracing::info!(
                            dispatch_id = %id,
                            technician_id = %technician.id,
                            status = %current.status,
                            "claimed during escalation, page skipped"
                        );
                    }
                }
            }
            None => {
                if self
                    .inner
                    .ledger
                    .expire(id, expected_attempt, Utc::now(), "no technicians remain")
                    .await?
                {
                    self.inner.scheduler.cancel(id);
                    metrics::counter!("triage_dispatches_expired_total").increment(1);
                    tracing::warn!(
                        dispatch_id = %id,
                        attempts = expected_attempt,
                        "dispatch expired unclaimed"
                    );
                    self.raise_alert(
                        &record,
                        AlertReason::CandidatesExhausted {
                            attempts: expected_attempt,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn page_and_arm(&self, technician: &Technician, record: &DispatchRecord, attempt: u32) {
        self.inner.notifier.page(technician, record);

        let id = record.id;
        let this = self.clone();
        self.inner
            .scheduler
            .arm(id, self.inner.claim_timeout, move || async move {
                if let Err(e) = this.on_deadline(id, attempt).await {
                    tracing::error!(dispatch_id = %id, attempt, error = %e, "escalation failed");
                }
            });
    }

    /// Alert on a background task; the caller's response never waits on
    /// supervisor delivery.
    fn raise_alert(&self, record: &DispatchRecord, reason: AlertReason) {
        metrics::counter!("triage_supervisor_alerts_total").increment(1);
        let alerter = Arc::clone(&self.inner.alerter);
        let alert = SupervisorAlert::for_record(record, reason);
        tokio::spawn(async move {
            alerter.alert(&alert).await;
        });
    }

    async fn load(&self, id: DispatchId) -> Result<DispatchRecord, DispatchError> {
        self.inner
            .ledger
            .get_dispatch(id)
            .await?
            .ok_or(DispatchError::NotFound(id))
    }

    fn not_claimable(record: DispatchRecord) -> ClaimOutcome {
        match record.claimed_by {
            Some(by) => ClaimOutcome::AlreadyClaimed { by },
            None => ClaimOutcome::NotPending {
                status: record.status,
            },
        }
    }
}

/// Collapse whitespace and cap length for the page body.
fn summarize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SUMMARY_MAX_CHARS {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(SUMMARY_MAX_CHARS).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_collapses_whitespace() {
        assert_eq!(summarize("  no heat,\n\tplease  help "), "no heat, please help");
    }

    #[test]
    fn summarize_truncates_long_text() {
        let long = "a".repeat(500);
        let s = summarize(&long);
        assert_eq!(s.chars().count(), SUMMARY_MAX_CHARS + 3);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn ledger_not_found_maps_to_dispatch_not_found() {
        let id = DispatchId::new();
        let err: DispatchError = LedgerError::NotFound(id).into();
        assert!(matches!(err, DispatchError::NotFound(found) if found == id));
    }

    #[test]
    fn claim_outcome_messages() {
        let by = TechnicianId::new("tech-a").unwrap();
        assert!(ClaimOutcome::Claimed { by: by.clone() }.is_claimed());
        assert_eq!(
            ClaimOutcome::AlreadyClaimed { by }.message(),
            "Dispatch already claimed by tech-a."
        );
        assert!(!ClaimOutcome::NotNotified.is_claimed());
    }
}
