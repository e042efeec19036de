//! # Validation Errors
//!
//! Raised when an inbound message or roster entry fails its constructor
//! checks. These map to 422 responses at the HTTP boundary.

use thiserror::Error;

/// A domain value failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A phone number contained no digits or unexpected characters.
    #[error("invalid phone number: {0:?}")]
    InvalidPhone(String),

    /// A technician identifier was empty or contained whitespace.
    #[error("invalid technician id: {0:?}")]
    InvalidTechnicianId(String),

    /// A category string did not name a known category.
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    /// A message source string did not name a known channel.
    #[error("unknown message source: {0:?}")]
    UnknownSource(String),

    /// A field exceeded its maximum length.
    #[error("{field} exceeds {max} characters")]
    TooLong {
        /// Offending field.
        field: &'static str,
        /// Maximum permitted length.
        max: usize,
    },
}
