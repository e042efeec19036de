//! # Middleware
//!
//! HTTP request metrics. Authentication lives in [`crate::auth`].

pub mod metrics;
