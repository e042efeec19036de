//! End-to-end coordinator behaviour against the in-memory ledger, an
//! outbox SMS gateway and a paused Tokio clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use triage_core::{
    Category, DispatchId, InboundMessage, MessageSource, Priority, Technician, TechnicianId,
};
use triage_dispatch::{
    AlertReason, ClaimOutcome, Coordinator, DispatchConfig, DispatchError, InMemoryDirectory,
    InMemoryLedger, Ledger, LedgerError, Notifier, NotifyError, OutboxGateway, ReplyVerb,
    RetryPolicy, SmsAlerter, SmsGateway, SupervisorAlert, SupervisorAlerter, TechnicianReply,
};
use triage_state::{DispatchRecord, DispatchStatus, EscalationStep, TriageLogEntry};

// -- Harness ------------------------------------------------------------------

#[derive(Default)]
struct RecordingAlerter {
    alerts: Mutex<Vec<SupervisorAlert>>,
}

#[async_trait]
impl SupervisorAlerter for RecordingAlerter {
    async fn alert(&self, alert: &SupervisorAlert) {
        self.alerts.lock().push(alert.clone());
    }
}

struct Harness {
    coordinator: Coordinator,
    ledger: Arc<InMemoryLedger>,
    outbox: OutboxGateway,
    alerts: Arc<RecordingAlerter>,
}

const CLAIM_TIMEOUT: Duration = Duration::from_secs(120);

fn tech(id: &str, phone: &str, categories: &[Category]) -> Technician {
    Technician::new(
        TechnicianId::new(id).unwrap(),
        format!("Tech {id}"),
        phone,
        categories.iter().copied(),
        true,
    )
    .unwrap()
}

fn two_hvac_techs() -> Vec<Technician> {
    vec![
        tech("tech-a", "5550001", &[Category::Hvac]),
        tech("tech-b", "5550002", &[Category::Hvac, Category::Plumbing]),
        tech("tech-z", "5550026", &[Category::Electrical]),
    ]
}

fn harness_with(technicians: Vec<Technician>, config: DispatchConfig) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let outbox = OutboxGateway::new();
    let alerts = Arc::new(RecordingAlerter::default());
    let coordinator = Coordinator::new(
        ledger.clone(),
        Arc::new(InMemoryDirectory::new(technicians).unwrap()),
        Notifier::new(Arc::new(outbox.clone()), RetryPolicy::default()),
        alerts.clone(),
        &config,
    );
    Harness {
        coordinator,
        ledger,
        outbox,
        alerts,
    }
}

fn harness(technicians: Vec<Technician>) -> Harness {
    harness_with(
        technicians,
        DispatchConfig {
            claim_timeout: CLAIM_TIMEOUT,
            ..DispatchConfig::default()
        },
    )
}

fn message(text: &str) -> InboundMessage {
    InboundMessage::new("cust-42", "555-010-0100", text, MessageSource::Sms, Utc::now()).unwrap()
}

fn reply(dispatch_id: triage_core::DispatchId, from: &str, verb: ReplyVerb) -> TechnicianReply {
    TechnicianReply {
        dispatch_id,
        from: from.to_string(),
        verb,
    }
}

/// Let spawned tasks (pages, fired timers) run to completion.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn pass_deadline() {
    tokio::time::advance(CLAIM_TIMEOUT + Duration::from_secs(1)).await;
    settle().await;
}

// -- End to end ---------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn no_heat_is_dispatched_paged_and_claimed() {
    let h = harness(two_hvac_techs());

    let outcome = h
        .coordinator
        .handle(message("no heat, please help"))
        .await
        .unwrap();
    assert_eq!(outcome.triage.priority, Priority::Emergency);
    assert_eq!(outcome.triage.category, Category::Hvac);
    assert!(outcome.triage.dispatch_required);
    assert_eq!(outcome.triage.estimated_response.to_string(), "15-30 minutes");
    let id = outcome.dispatch_id.expect("emergency must dispatch");

    settle().await;
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Pending);
    assert_eq!(record.attempt, 1);
    assert_eq!(record.candidate_technicians, vec![TechnicianId::new("tech-a").unwrap()]);

    let pages = h.outbox.sent_to("5550001");
    assert_eq!(pages.len(), 1);
    assert!(pages[0].body.starts_with("[EMERGENCY HVAC] Dispatch "));
    assert!(pages[0].body.contains("no heat, please help"));
    assert!(pages[0].body.ends_with("Customer: 5550100100. Reply ACCEPT or DECLINE."));

    let claimed = h
        .coordinator
        .claim(reply(id, "(555) 0001", ReplyVerb::Accept))
        .await
        .unwrap();
    assert_eq!(
        claimed,
        ClaimOutcome::Claimed {
            by: TechnicianId::new("tech-a").unwrap()
        }
    );
    assert_eq!(h.coordinator.pending_timers(), 0);

    pass_deadline().await;
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Claimed);
    assert_eq!(record.attempt, 1);
    assert_eq!(h.outbox.sent_to("5550002").len(), 0, "no escalation after claim");

    let log = h.ledger.triage_log().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].dispatch_id, Some(id));
}

#[tokio::test(start_paused = true)]
async fn routine_message_is_logged_without_dispatch() {
    let h = harness(two_hvac_techs());
    let outcome = h
        .coordinator
        .handle(message("please schedule a thermostat check next week"))
        .await
        .unwrap();
    assert_eq!(outcome.triage.priority, Priority::Routine);
    assert!(outcome.dispatch_id.is_none());

    settle().await;
    assert!(h.ledger.list_dispatches().await.unwrap().is_empty());
    assert_eq!(h.ledger.triage_log().await.unwrap().len(), 1);
    assert!(h.outbox.sent().is_empty());
}

// -- Escalation ---------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_technicians_time_out_then_expired_at_attempt_two() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    pass_deadline().await;
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Pending);
    assert_eq!(record.attempt, 2);
    assert_eq!(h.outbox.sent_to("5550002").len(), 1, "backup technician paged");

    pass_deadline().await;
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Expired);
    assert_eq!(record.attempt, 2);
    assert!(record.claimed_by.is_none());
    assert_eq!(h.coordinator.pending_timers(), 0);

    let alerts = h.alerts.alerts.lock().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].reason, AlertReason::CandidatesExhausted { attempts: 2 });

    let hops: Vec<_> = record.transition_log.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        hops,
        vec![
            (DispatchStatus::Pending, DispatchStatus::Escalated),
            (DispatchStatus::Escalated, DispatchStatus::Pending),
            (DispatchStatus::Pending, DispatchStatus::Expired),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn max_attempts_caps_escalation() {
    let h = harness_with(
        two_hvac_techs(),
        DispatchConfig {
            claim_timeout: CLAIM_TIMEOUT,
            max_attempts: Some(1),
            ..DispatchConfig::default()
        },
    );
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    pass_deadline().await;
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Expired);
    assert_eq!(record.attempt, 1);
    assert!(h.outbox.sent_to("5550002").is_empty());
}

#[tokio::test(start_paused = true)]
async fn decline_escalates_immediately() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    let outcome = h
        .coordinator
        .claim(reply(id, "5550001", ReplyVerb::Decline))
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::Declined);
    settle().await;

    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.attempt, 2);
    assert_eq!(
        record.current_technician(),
        Some(&TechnicianId::new("tech-b").unwrap())
    );
    assert_eq!(record.transition_log[0].reason, "declined by technician");
    assert_eq!(h.outbox.sent_to("5550002").len(), 1);
    assert_eq!(h.coordinator.pending_timers(), 1, "timer re-armed for tech-b");

    let claimed = h
        .coordinator
        .claim(reply(id, "5550002", ReplyVerb::Accept))
        .await
        .unwrap();
    assert!(claimed.is_claimed());
}

#[tokio::test(start_paused = true)]
async fn stale_timer_after_claim_has_no_effect() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    h.coordinator
        .claim(reply(id, "5550001", ReplyVerb::Accept))
        .await
        .unwrap();
    let before = h.ledger.get_dispatch(id).await.unwrap().unwrap();

    // Simulate a timer that fired despite cancellation.
    h.coordinator.on_deadline(id, 1).await.unwrap();
    settle().await;

    let after = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(after, before);
    assert!(h.outbox.sent_to("5550002").is_empty());
}

#[tokio::test(start_paused = true)]
async fn superseded_attempt_timer_has_no_effect() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    pass_deadline().await;
    let before = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(before.attempt, 2);

    h.coordinator.on_deadline(id, 1).await.unwrap();
    let after = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(after, before, "attempt-1 timer must not expire attempt 2");
}

// -- Claims -------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn no_technician_expires_immediately_with_alert() {
    let h = harness(vec![tech("tech-z", "5550026", &[Category::Electrical])]);
    let id = h
        .coordinator
        .handle(message("burst pipe in basement"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    settle().await;

    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Expired);
    assert_eq!(record.attempt, 0);
    assert!(record.candidate_technicians.is_empty());
    assert!(h.outbox.sent().is_empty());
    assert_eq!(h.coordinator.pending_timers(), 0);

    let alerts = h.alerts.alerts.lock().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].reason, AlertReason::NoTechnicianAvailable);
    assert_eq!(alerts[0].headline, "EMERGENCY PLUMBING");
}

#[tokio::test(start_paused = true)]
async fn reply_from_unpaged_technician_is_not_notified() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    let outcome = h
        .coordinator
        .claim(reply(id, "5550002", ReplyVerb::Accept))
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::NotNotified);
    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn unknown_sender_and_unknown_dispatch_are_errors() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    let err = h
        .coordinator
        .claim(reply(id, "5559999", ReplyVerb::Accept))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownSender(_)));

    let missing = triage_core::DispatchId::new();
    let err = h
        .coordinator
        .claim(reply(missing, "5550001", ReplyVerb::Accept))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound(found) if found == missing));
}

#[tokio::test(start_paused = true)]
async fn claim_after_expiry_reports_status() {
    let h = harness(vec![tech("tech-a", "5550001", &[Category::Hvac])]);
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    pass_deadline().await;

    let outcome = h
        .coordinator
        .claim(reply(id, "5550001", ReplyVerb::Accept))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ClaimOutcome::NotPending {
            status: DispatchStatus::Expired
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_exactly_one_winner() {
    let h = harness(two_hvac_techs());
    let id = h
        .coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    // Page tech-b as well so two distinct technicians race.
    h.coordinator
        .claim(reply(id, "5550001", ReplyVerb::Decline))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let coordinator = h.coordinator.clone();
        let from = if i % 2 == 0 { "5550001" } else { "5550002" };
        tasks.push(tokio::spawn(async move {
            coordinator
                .claim(reply(id, from, ReplyVerb::Accept))
                .await
                .unwrap()
        }));
    }

    let mut winners = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            ClaimOutcome::Claimed { by } => winners.push(by),
            ClaimOutcome::AlreadyClaimed { .. } => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1, "exactly one claim succeeds");

    let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Claimed);
    assert_eq!(record.claimed_by.as_ref(), Some(&winners[0]));
    assert_eq!(
        record
            .transition_log
            .iter()
            .filter(|t| t.to == DispatchStatus::Claimed)
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_accept_racing_deadline_never_both_claims_and_expires() {
    for _ in 0..200 {
        let h = harness(vec![tech("tech-a", "5550001", &[Category::Hvac])]);
        let id = h
            .coordinator
            .handle(message("no heat"))
            .await
            .unwrap()
            .dispatch_id
            .unwrap();

        let claimer = h.coordinator.clone();
        let accept = tokio::spawn(async move {
            claimer
                .claim(reply(id, "5550001", ReplyVerb::Accept))
                .await
                .unwrap()
        });
        let timer = h.coordinator.clone();
        let deadline = tokio::spawn(async move { timer.on_deadline(id, 1).await.unwrap() });
        let (outcome, ()) = (accept.await.unwrap(), deadline.await.unwrap());

        let record = h.ledger.get_dispatch(id).await.unwrap().unwrap();
        let targets: Vec<_> = record.transition_log.iter().map(|t| t.to).collect();
        match record.status {
            DispatchStatus::Claimed => {
                assert!(outcome.is_claimed());
                assert_eq!(record.claimed_by, Some(TechnicianId::new("tech-a").unwrap()));
                assert_eq!(record.candidate_technicians, vec![TechnicianId::new("tech-a").unwrap()]);
                assert!(!targets.contains(&DispatchStatus::Expired));
            }
            DispatchStatus::Expired => {
                assert_eq!(
                    outcome,
                    ClaimOutcome::NotPending {
                        status: DispatchStatus::Expired
                    }
                );
                assert!(record.claimed_by.is_none());
                assert!(!targets.contains(&DispatchStatus::Claimed));
            }
            other => panic!("unexpected final status {other}"),
        }
    }
}

// -- Supervisor delivery ------------------------------------------------------

/// A provider that accepts the request and never answers.
struct SilentGateway;

#[async_trait]
impl SmsGateway for SilentGateway {
    async fn send(&self, _to: &str, _body: &str) -> Result<(), NotifyError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_supervisor_sms_does_not_delay_responses() {
    let gateway: Arc<dyn SmsGateway> = Arc::new(SilentGateway);
    let ledger = Arc::new(InMemoryLedger::new());
    let coordinator = Coordinator::new(
        ledger.clone(),
        Arc::new(InMemoryDirectory::new(vec![tech("tech-a", "5550001", &[Category::Hvac])]).unwrap()),
        Notifier::new(gateway.clone(), RetryPolicy::default()),
        Arc::new(SmsAlerter::new(gateway, RetryPolicy::default(), "5559999")),
        &DispatchConfig {
            claim_timeout: CLAIM_TIMEOUT,
            ..DispatchConfig::default()
        },
    );

    // Unstaffed category: expired and alerted inside handle().
    let start = tokio::time::Instant::now();
    let unstaffed = coordinator
        .handle(message("burst pipe in basement"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    let record = ledger.get_dispatch(unstaffed).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Expired);

    // Decline with nobody left: expired and alerted inside claim().
    let id = coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();
    let start = tokio::time::Instant::now();
    let outcome = coordinator
        .claim(reply(id, "5550001", ReplyVerb::Decline))
        .await
        .unwrap();
    assert_eq!(outcome, ClaimOutcome::Declined);
    assert_eq!(start.elapsed(), Duration::ZERO);
    let record = ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Expired);
}

// -- Claim during escalation --------------------------------------------------

/// Lands a claim by `claimant` right after every successful escalation CAS.
struct ClaimAfterEscalate {
    inner: InMemoryLedger,
    claimant: TechnicianId,
}

#[async_trait]
impl Ledger for ClaimAfterEscalate {
    async fn log_triage(&self, entry: TriageLogEntry) -> Result<(), LedgerError> {
        self.inner.log_triage(entry).await
    }

    async fn create_dispatch(&self, record: DispatchRecord) -> Result<DispatchId, LedgerError> {
        self.inner.create_dispatch(record).await
    }

    async fn try_claim(
        &self,
        id: DispatchId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        self.inner.try_claim(id, technician, at).await
    }

    async fn escalate(&self, id: DispatchId, step: &EscalationStep) -> Result<bool, LedgerError> {
        let escalated = self.inner.escalate(id, step).await?;
        if escalated {
            self.inner.try_claim(id, &self.claimant, Utc::now()).await?;
        }
        Ok(escalated)
    }

    async fn expire(
        &self,
        id: DispatchId,
        expected_attempt: u32,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<bool, LedgerError> {
        self.inner.expire(id, expected_attempt, at, reason).await
    }

    async fn get_dispatch(&self, id: DispatchId) -> Result<Option<DispatchRecord>, LedgerError> {
        self.inner.get_dispatch(id).await
    }

    async fn list_dispatches(&self) -> Result<Vec<DispatchRecord>, LedgerError> {
        self.inner.list_dispatches().await
    }

    async fn triage_log(&self) -> Result<Vec<TriageLogEntry>, LedgerError> {
        self.inner.triage_log().await
    }
}

#[tokio::test(start_paused = true)]
async fn claim_during_escalation_skips_next_page() {
    let ledger = Arc::new(ClaimAfterEscalate {
        inner: InMemoryLedger::new(),
        claimant: TechnicianId::new("tech-a").unwrap(),
    });
    let outbox = OutboxGateway::new();
    let coordinator = Coordinator::new(
        ledger.clone(),
        Arc::new(InMemoryDirectory::new(two_hvac_techs()).unwrap()),
        Notifier::new(Arc::new(outbox.clone()), RetryPolicy::default()),
        Arc::new(RecordingAlerter::default()),
        &DispatchConfig {
            claim_timeout: CLAIM_TIMEOUT,
            ..DispatchConfig::default()
        },
    );
    let id = coordinator
        .handle(message("no heat"))
        .await
        .unwrap()
        .dispatch_id
        .unwrap();

    coordinator.on_deadline(id, 1).await.unwrap();
    settle().await;

    let record = ledger.get_dispatch(id).await.unwrap().unwrap();
    assert_eq!(record.status, DispatchStatus::Claimed);
    assert_eq!(record.claimed_by, Some(TechnicianId::new("tech-a").unwrap()));
    assert!(outbox.sent_to("5550002").is_empty(), "claimed job is not paged out");
}
