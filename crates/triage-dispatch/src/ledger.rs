//! # Dispatch Ledger
//!
//! The append-only triage log plus the mutable dispatch table. Every
//! mutation of a dispatch is a single compare-and-set against the stored
//! record: a CAS that loses returns `Ok(false)`, never an error.
//!
//! [`InMemoryLedger`] runs each CAS under one write lock. The PostgreSQL
//! implementation lives in `triage-api` and expresses the same CAS as a
//! conditional `UPDATE`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use triage_core::{DispatchId, TechnicianId};
use triage_state::{DispatchRecord, EscalationStep, TransitionError, TriageLogEntry};

/// Ledger failures. Lost races are not errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("dispatch {0} not found")]
    NotFound(DispatchId),

    #[error("dispatch {0} already exists")]
    Duplicate(DispatchId),

    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Persistent store of triage events and dispatch records.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    /// Append a triage event. Called for every inbound message.
    async fn log_triage(&self, entry: TriageLogEntry) -> Result<(), LedgerError>;

    /// Insert a new `PENDING` dispatch.
    async fn create_dispatch(&self, record: DispatchRecord) -> Result<DispatchId, LedgerError>;

    /// `PENDING → CLAIMED` if unclaimed. Exactly one concurrent caller
    /// observes `true`.
    async fn try_claim(
        &self,
        id: DispatchId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;

    /// Page the next technician if still `PENDING` at `step.expected_attempt`.
    async fn escalate(&self, id: DispatchId, step: &EscalationStep) -> Result<bool, LedgerError>;

    /// `PENDING → EXPIRED` if still at `expected_attempt`.
    async fn expire(
        &self,
        id: DispatchId,
        expected_attempt: u32,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, LedgerError>;

    async fn get_dispatch(&self, id: DispatchId) -> Result<Option<DispatchRecord>, LedgerError>;

    /// All dispatches, newest first.
    async fn list_dispatches(&self) -> Result<Vec<DispatchRecord>, LedgerError>;

    /// The triage log in insertion order.
    async fn triage_log(&self) -> Result<Vec<TriageLogEntry>, LedgerError>;
}

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable map of dispatch records.
///
/// The lock is `parking_lot` and is never held across an `.await`.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<DispatchId, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert only if `id` is absent. Returns `false` if it was present.
    pub fn insert_new(&self, id: DispatchId, value: T) -> bool {
        use std::collections::hash_map::Entry;
        match self.data.write().entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn get(&self, id: &DispatchId) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs under a single write lock. Returns `None` if the
    /// record does not exist.
    pub fn try_update<R, E>(
        &self,
        id: &DispatchId,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

/// Ledger backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    dispatches: Store<DispatchRecord>,
    log: Arc<RwLock<Vec<TriageLogEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn cas(
        &self,
        id: DispatchId,
        op: &'static str,
        f: impl FnOnce(&mut DispatchRecord) -> Result<(), TransitionError>,
    ) -> Result<bool, LedgerError> {
        match self.dispatches.try_update(&id, f) {
            None => Err(LedgerError::NotFound(id)),
            Some(Ok(())) => Ok(true),
            Some(Err(rejected)) => {
                tracing::debug!(dispatch_id = %id, op, %rejected, "ledger CAS lost");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn log_triage(&self, entry: TriageLogEntry) -> Result<(), LedgerError> {
        self.log.write().push(entry);
        Ok(())
    }

    async fn create_dispatch(&self, record: DispatchRecord) -> Result<DispatchId, LedgerError> {
        let id = record.id;
        if self.dispatches.insert_new(id, record) {
            Ok(id)
        } else {
            Err(LedgerError::Duplicate(id))
        }
    }

    async fn try_claim(
        &self,
        id: DispatchId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.cas(id, "claim", |r| r.claim(technician, at))
    }

    async fn escalate(&self, id: DispatchId, step: &EscalationStep) -> Result<bool, LedgerError> {
        self.cas(id, "escalate", |r| r.escalate(step))
    }

    async fn expire(
        &self,
        id: DispatchId,
        expected_attempt: u32,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, LedgerError> {
        self.cas(id, "expire", |r| r.expire(expected_attempt, at, reason))
    }

    async fn get_dispatch(&self, id: DispatchId) -> Result<Option<DispatchRecord>, LedgerError> {
        Ok(self.dispatches.get(&id))
    }

    async fn list_dispatches(&self) -> Result<Vec<DispatchRecord>, LedgerError> {
        let mut all = self.dispatches.list();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    async fn triage_log(&self) -> Result<Vec<TriageLogEntry>, LedgerError> {
        Ok(self.log.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use triage_core::{Category, CustomerId, Priority, TriageResult};
    use triage_state::{DispatchStatus, NewDispatch};

    fn tech(id: &str) -> TechnicianId {
        TechnicianId::new(id).unwrap()
    }

    fn record() -> DispatchRecord {
        let now = Utc::now();
        DispatchRecord::pending(
            NewDispatch {
                id: DispatchId::new(),
                customer_id: CustomerId("cust-1".into()),
                customer_phone: "5550100".into(),
                summary: "burst pipe".into(),
                triage: TriageResult {
                    priority: Priority::Emergency,
                    category: Category::Plumbing,
                    dispatch_required: true,
                    estimated_response: Priority::Emergency.response_window(),
                    notes: String::new(),
                },
                created_at: now,
            },
            tech("tech-a"),
            now + Duration::seconds(120),
        )
    }

    #[tokio::test]
    async fn claim_wins_once() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_dispatch(record()).await.unwrap();

        assert!(ledger.try_claim(id, &tech("tech-a"), Utc::now()).await.unwrap());
        assert!(!ledger.try_claim(id, &tech("tech-b"), Utc::now()).await.unwrap());

        let stored = ledger.get_dispatch(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Claimed);
        assert_eq!(stored.claimed_by, Some(tech("tech-a")));
    }

    #[tokio::test]
    async fn unknown_dispatch_is_not_found() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .try_claim(DispatchId::new(), &tech("tech-a"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let ledger = InMemoryLedger::new();
        let r = record();
        ledger.create_dispatch(r.clone()).await.unwrap();
        assert!(matches!(
            ledger.create_dispatch(r).await,
            Err(LedgerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn expire_after_claim_is_a_lost_cas() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_dispatch(record()).await.unwrap();
        ledger.try_claim(id, &tech("tech-a"), Utc::now()).await.unwrap();

        assert!(!ledger.expire(id, 1, Utc::now(), "late").await.unwrap());
        let stored = ledger.get_dispatch(id).await.unwrap().unwrap();
        assert_eq!(stored.status, DispatchStatus::Claimed);
    }

    #[tokio::test]
    async fn escalate_with_stale_attempt_is_a_lost_cas() {
        let ledger = InMemoryLedger::new();
        let id = ledger.create_dispatch(record()).await.unwrap();
        let now = Utc::now();
        let step = |expected_attempt, next: &str| EscalationStep {
            expected_attempt,
            next_technician: tech(next),
            notified_at: now,
            deadline_at: now + Duration::seconds(120),
            reason: "claim deadline passed".into(),
        };

        assert!(ledger.escalate(id, &step(1, "tech-b")).await.unwrap());
        assert!(!ledger.escalate(id, &step(1, "tech-c")).await.unwrap());
        let stored = ledger.get_dispatch(id).await.unwrap().unwrap();
        assert_eq!(stored.attempt, 2);
        assert_eq!(stored.current_technician(), Some(&tech("tech-b")));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let ledger = InMemoryLedger::new();
        let mut older = record();
        older.created_at -= Duration::seconds(60);
        let newer = record();
        ledger.create_dispatch(older.clone()).await.unwrap();
        ledger.create_dispatch(newer.clone()).await.unwrap();

        let ids: Vec<_> = ledger
            .list_dispatches()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}
