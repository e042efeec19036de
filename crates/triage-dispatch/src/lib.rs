//! # triage-dispatch — On-Call Dispatch Coordination
//!
//! Everything between a classified message and a claimed job:
//!
//! - **directory**: read-only roster lookup ([`Directory`], [`InMemoryDirectory`]).
//! - **ledger**: triage log and dispatch table with per-record CAS
//!   ([`Ledger`], [`InMemoryLedger`]).
//! - **notifier**: outbound pages with retry/backoff ([`SmsGateway`], [`Notifier`]).
//! - **escalation**: per-dispatch cancellable timers ([`EscalationScheduler`]).
//! - **supervisor**: alerts for unstaffed dispatches ([`SupervisorAlerter`]).
//! - **coordinator**: orchestration ([`Coordinator`]).
//!
//! ## Concurrency Model
//!
//! Every inbound event runs on its own task. There is no coordinator-wide
//! lock; the only synchronization point is the ledger CAS. A racing
//! operation that loses its CAS is discarded. Timers re-read the ledger
//! when they fire and do nothing unless the dispatch is still `PENDING` at
//! the attempt they were armed for.
//!
//! ## Crate Policy
//!
//! - Trait seams for every external collaborator (store, roster, SMS,
//!   supervisor) so tests run without network or database.
//! - No `.unwrap()` outside tests.

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod escalation;
pub mod ledger;
pub mod notifier;
pub mod supervisor;

pub use config::{ConfigError, DispatchConfig};
pub use coordinator::{ClaimOutcome, Coordinator, DispatchError, HandleOutcome};
pub use directory::{Directory, InMemoryDirectory, RosterError};
pub use escalation::EscalationScheduler;
pub use ledger::{InMemoryLedger, Ledger, LedgerError};
pub use notifier::{
    page_body, send_with_retry, HttpSmsGateway, LogGateway, Notifier, NotifyError, OutboundSms,
    OutboxGateway, ReplyVerb, RetryPolicy, SmsGateway, TechnicianReply,
};
pub use supervisor::{AlertReason, SmsAlerter, SupervisorAlert, SupervisorAlerter, TracingAlerter};
