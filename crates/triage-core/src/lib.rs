//! # triage-core — Foundational Types for the Dispatch Coordinator
//!
//! Defines the vocabulary shared by every other crate in the workspace:
//! identifiers, the triage enums (priority, category, message source),
//! the immutable inbound message, the classifier's `TriageResult`, and the
//! roster's `Technician`.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `DispatchId`, `TechnicianId`,
//!    `CustomerId` and `TriageEventId` cannot be confused with one another.
//!
//! 2. **Closed enums for triage vocabulary.** `Priority` and `Category` are
//!    exhaustive; adding a category forces every `match` to handle it.
//!
//! 3. **Validation at construction.** `InboundMessage::new` and
//!    `Technician::new` reject malformed input with [`ValidationError`], so
//!    nothing downstream sees an empty message or a phone-less technician.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `triage-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod domain;
pub mod error;
pub mod identity;
pub mod message;
pub mod technician;
pub mod triage;

pub use domain::{Category, MessageSource, Priority, ResponseWindow, CATEGORY_COUNT};
pub use error::ValidationError;
pub use identity::{CustomerId, DispatchId, TechnicianId, TriageEventId};
pub use message::InboundMessage;
pub use technician::{normalize_phone, Technician};
pub use triage::TriageResult;
