//! # triage-state — Dispatch Record State Machine
//!
//! The dispatch record is the only mutable entity in the coordinator. This
//! crate defines it, its status enum, and the runtime-checked transitions
//! that every ledger implementation applies under its compare-and-set.
//!
//! ## State Machine
//!
//! ```text
//!              claim()
//! PENDING ───────────────▶ CLAIMED (terminal)
//!    │ ▲
//!    │ │ re-arm
//!    ▼ │
//! ESCALATED
//!
//! PENDING ───expire()────▶ EXPIRED (terminal)
//! ```
//!
//! Escalation passes through `ESCALATED` and lands back on `PENDING` inside
//! a single transition call; both hops are written to the transition log.
//!
//! ## Invariants
//!
//! - `claimed_by` is written at most once.
//! - Terminal records (`CLAIMED`, `EXPIRED`) reject every transition.
//! - `attempt == candidate_technicians.len()` after every transition.
//! - Escalation and expiry carry the attempt number the caller observed;
//!   a mismatch means the caller's timer was superseded and the transition
//!   is rejected.

pub mod dispatch;
pub mod log;

pub use dispatch::{
    DispatchRecord, DispatchStatus, EscalationStep, NewDispatch, TransitionError,
    TransitionRecord,
};
pub use log::TriageLogEntry;
