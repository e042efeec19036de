//! # triage-cli — Operator Command-Line Interface
//!
//! ## Subcommands
//!
//! - `classify` prints the triage result for a message as JSON
//! - `roster check` validates a roster file and reports on-call coverage
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from the handlers.
//! - Handlers delegate to the domain crates and write to a caller-supplied
//!   writer so they can be tested without capturing stdout.

pub mod classify;
pub mod roster;
