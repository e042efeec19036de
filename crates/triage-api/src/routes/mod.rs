//! # API Route Modules
//!
//! - `dispatch`: inbound messages, technician replies, dispatch queue.
//! - `health`: liveness and readiness checks (unauthenticated).

pub mod dispatch;
pub mod health;
