//! Postgres-backed [`Ledger`].
//!
//! Each CAS runs in one transaction: the row is locked with
//! `SELECT ... FOR UPDATE`, the transition is applied through the same
//! `DispatchRecord` methods the in-memory ledger uses, and the row is
//! written back. A rejected transition rolls back and reports `false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use triage_core::{CustomerId, DispatchId, InboundMessage, TechnicianId, TriageEventId};
use triage_dispatch::{Ledger, LedgerError};
use triage_state::{DispatchRecord, DispatchStatus, EscalationStep, TransitionError, TriageLogEntry};

const SELECT_DISPATCH: &str = "SELECT id, customer_id, customer_phone, summary, triage, \
     candidate_technicians, claimed_by, status, attempt, notified_at, deadline_at, \
     created_at, updated_at, resolved_at, transition_log FROM dispatch_queue";

/// Ledger over the `triage_log` and `dispatch_queue` tables.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn cas(
        &self,
        id: DispatchId,
        op: &'static str,
        f: impl FnOnce(&mut DispatchRecord) -> Result<(), TransitionError> + Send,
    ) -> Result<bool, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query_as::<_, DispatchRow>(&format!("{SELECT_DISPATCH} WHERE id = $1 FOR UPDATE"))
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let Some(row) = row else {
            return Err(LedgerError::NotFound(id));
        };
        let mut record = row.into_record()?;

        if let Err(rejected) = f(&mut record) {
            tracing::debug!(dispatch_id = %id, op, %rejected, "ledger CAS lost");
            tx.rollback().await.map_err(storage)?;
            return Ok(false);
        }

        write_back(&mut tx, &record).await?;
        tx.commit().await.map_err(storage)?;
        Ok(true)
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn log_triage(&self, entry: TriageLogEntry) -> Result<(), LedgerError> {
        let message = serde_json::to_value(&entry.message).map_err(storage)?;
        let triage = serde_json::to_value(&entry.triage).map_err(storage)?;

        sqlx::query(
            "INSERT INTO triage_log (id, customer_id, message, priority, category, triage, dispatch_id, logged_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.0)
        .bind(&entry.message.customer_id.0)
        .bind(&message)
        .bind(entry.triage.priority.as_str())
        .bind(entry.triage.category.as_str())
        .bind(&triage)
        .bind(entry.dispatch_id.map(|d| d.0))
        .bind(entry.logged_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    async fn create_dispatch(&self, record: DispatchRecord) -> Result<DispatchId, LedgerError> {
        let triage = serde_json::to_value(&record.triage).map_err(storage)?;
        let log = serde_json::to_value(&record.transition_log).map_err(storage)?;
        let candidates: Vec<String> = record
            .candidate_technicians
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();

        let result = sqlx::query(
            "INSERT INTO dispatch_queue (id, customer_id, customer_phone, summary, triage,
                 candidate_technicians, claimed_by, status, attempt, notified_at, deadline_at,
                 created_at, updated_at, resolved_at, transition_log)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(record.id.0)
        .bind(&record.customer_id.0)
        .bind(&record.customer_phone)
        .bind(&record.summary)
        .bind(&triage)
        .bind(&candidates)
        .bind(record.claimed_by.as_ref().map(|t| t.as_str().to_string()))
        .bind(record.status.as_str())
        .bind(attempt_to_db(record.attempt)?)
        .bind(record.notified_at)
        .bind(record.deadline_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.resolved_at)
        .bind(&log)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::Duplicate(record.id));
        }
        Ok(record.id)
    }

    async fn try_claim(
        &self,
        id: DispatchId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.cas(id, "claim", |r| r.claim(technician, at)).await
    }

    async fn escalate(&self, id: DispatchId, step: &EscalationStep) -> Result<bool, LedgerError> {
        self.cas(id, "escalate", |r| r.escalate(step)).await
    }

    async fn expire(
        &self,
        id: DispatchId,
        expected_attempt: u32,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, LedgerError> {
        self.cas(id, "expire", |r| r.expire(expected_attempt, at, reason))
            .await
    }

    async fn get_dispatch(&self, id: DispatchId) -> Result<Option<DispatchRecord>, LedgerError> {
        let row = sqlx::query_as::<_, DispatchRow>(&format!("{SELECT_DISPATCH} WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(DispatchRow::into_record).transpose()
    }

    async fn list_dispatches(&self) -> Result<Vec<DispatchRecord>, LedgerError> {
        let rows = sqlx::query_as::<_, DispatchRow>(&format!(
            "{SELECT_DISPATCH} ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(DispatchRow::into_record).collect()
    }

    async fn triage_log(&self) -> Result<Vec<TriageLogEntry>, LedgerError> {
        let rows = sqlx::query_as::<_, TriageLogRow>(
            "SELECT id, message, triage, dispatch_id, logged_at FROM triage_log ORDER BY logged_at, id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(TriageLogRow::into_entry).collect()
    }
}

async fn write_back(
    tx: &mut Transaction<'_, Postgres>,
    record: &DispatchRecord,
) -> Result<(), LedgerError> {
    let log = serde_json::to_value(&record.transition_log).map_err(storage)?;
    let candidates: Vec<String> = record
        .candidate_technicians
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();

    sqlx::query(
        "UPDATE dispatch_queue SET candidate_technicians = $1, claimed_by = $2, status = $3,
             attempt = $4, notified_at = $5, deadline_at = $6, updated_at = $7,
             resolved_at = $8, transition_log = $9
         WHERE id = $10",
    )
    .bind(&candidates)
    .bind(record.claimed_by.as_ref().map(|t| t.as_str().to_string()))
    .bind(record.status.as_str())
    .bind(attempt_to_db(record.attempt)?)
    .bind(record.notified_at)
    .bind(record.deadline_at)
    .bind(record.updated_at)
    .bind(record.resolved_at)
    .bind(&log)
    .bind(record.id.0)
    .execute(&mut **tx)
    .await
    .map_err(storage)?;

    Ok(())
}

fn storage(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn attempt_to_db(attempt: u32) -> Result<i32, LedgerError> {
    i32::try_from(attempt).map_err(|_| storage(format!("attempt {attempt} out of range")))
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct DispatchRow {
    id: Uuid,
    customer_id: String,
    customer_phone: String,
    summary: String,
    triage: serde_json::Value,
    candidate_technicians: Vec<String>,
    claimed_by: Option<String>,
    status: String,
    attempt: i32,
    notified_at: Option<DateTime<Utc>>,
    deadline_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    transition_log: serde_json::Value,
}

impl DispatchRow {
    fn into_record(self) -> Result<DispatchRecord, LedgerError> {
        let candidate_technicians = self
            .candidate_technicians
            .into_iter()
            .map(TechnicianId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;
        let claimed_by = self
            .claimed_by
            .map(TechnicianId::new)
            .transpose()
            .map_err(storage)?;
        let status: DispatchStatus = self.status.parse().map_err(storage)?;
        let attempt = u32::try_from(self.attempt).map_err(storage)?;

        Ok(DispatchRecord {
            id: DispatchId(self.id),
            customer_id: CustomerId(self.customer_id),
            customer_phone: self.customer_phone,
            summary: self.summary,
            triage: serde_json::from_value(self.triage).map_err(storage)?,
            candidate_technicians,
            claimed_by,
            status,
            attempt,
            notified_at: self.notified_at,
            deadline_at: self.deadline_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
            transition_log: serde_json::from_value(self.transition_log).map_err(storage)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TriageLogRow {
    id: Uuid,
    message: serde_json::Value,
    triage: serde_json::Value,
    dispatch_id: Option<Uuid>,
    logged_at: DateTime<Utc>,
}

impl TriageLogRow {
    fn into_entry(self) -> Result<TriageLogEntry, LedgerError> {
        let message: InboundMessage = serde_json::from_value(self.message).map_err(storage)?;
        Ok(TriageLogEntry {
            id: TriageEventId(self.id),
            message,
            triage: serde_json::from_value(self.triage).map_err(storage)?,
            dispatch_id: self.dispatch_id.map(DispatchId),
            logged_at: self.logged_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, candidates: Vec<&str>, attempt: i32) -> DispatchRow {
        let now = Utc::now();
        DispatchRow {
            id: Uuid::new_v4(),
            customer_id: "cust-1".into(),
            customer_phone: "5550100".into(),
            summary: "no heat".into(),
            triage: serde_json::json!({
                "priority": "EMERGENCY",
                "category": "HVAC",
                "dispatchRequired": true,
                "estimatedResponse": {"minMinutes": 15, "maxMinutes": 30},
                "notes": "emergency keyword: no heat"
            }),
            candidate_technicians: candidates.into_iter().map(String::from).collect(),
            claimed_by: None,
            status: status.into(),
            attempt,
            notified_at: Some(now),
            deadline_at: Some(now),
            created_at: now,
            updated_at: now,
            resolved_at: None,
            transition_log: serde_json::json!([]),
        }
    }

    #[test]
    fn row_maps_to_record() {
        let record = row("PENDING", vec!["tech-a"], 1).into_record().unwrap();
        assert_eq!(record.status, DispatchStatus::Pending);
        assert_eq!(record.attempt, 1);
        assert_eq!(record.current_technician().unwrap().as_str(), "tech-a");
        assert_eq!(record.triage.category, triage_core::Category::Hvac);
    }

    #[test]
    fn corrupt_status_is_a_storage_error() {
        let err = row("LOST", vec![], 0).into_record().unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn negative_attempt_is_a_storage_error() {
        assert!(row("PENDING", vec![], -1).into_record().is_err());
    }

    #[test]
    fn attempt_bounds() {
        assert_eq!(attempt_to_db(3).unwrap(), 3);
        assert!(attempt_to_db(u32::MAX).is_err());
    }
}
