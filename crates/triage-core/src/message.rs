//! # Inbound Messages
//!
//! One customer utterance from any channel. Created once per event and
//! never mutated; the triage log stores it verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::MessageSource;
use crate::error::ValidationError;
use crate::identity::CustomerId;
use crate::technician::normalize_phone;

/// Upper bound on message text accepted from upstream channels.
pub const MAX_TEXT_LEN: usize = 4096;

/// An inbound customer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub customer_id: CustomerId,
    /// Customer phone, normalized to digits with an optional leading `+`.
    pub phone_number: String,
    pub text: String,
    pub source: MessageSource,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a validated message.
    ///
    /// Rejects a blank customer id, blank or malformed phone number, and
    /// blank or oversized text.
    pub fn new(
        customer_id: impl Into<String>,
        phone_number: &str,
        text: impl Into<String>,
        source: MessageSource,
        received_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let customer_id = customer_id.into();
        if customer_id.trim().is_empty() {
            return Err(ValidationError::MissingField("customerId"));
        }
        if phone_number.trim().is_empty() {
            return Err(ValidationError::MissingField("phoneNumber"));
        }
        let phone_number = normalize_phone(phone_number)?;
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::MissingField("message"));
        }
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(ValidationError::TooLong {
                field: "message",
                max: MAX_TEXT_LEN,
            });
        }
        Ok(Self {
            customer_id: CustomerId(customer_id.trim().to_string()),
            phone_number,
            text,
            source,
            received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(customer: &str, phone: &str, text: &str) -> Result<InboundMessage, ValidationError> {
        InboundMessage::new(customer, phone, text, MessageSource::Sms, Utc::now())
    }

    #[test]
    fn valid_message_normalizes_phone() {
        let msg = build("cust-1", "+1 (555) 010-2000", "no heat").unwrap();
        assert_eq!(msg.phone_number, "+15550102000");
        assert_eq!(msg.customer_id.as_str(), "cust-1");
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert_eq!(
            build("  ", "5550100", "no heat").unwrap_err(),
            ValidationError::MissingField("customerId")
        );
        assert_eq!(
            build("c", "", "no heat").unwrap_err(),
            ValidationError::MissingField("phoneNumber")
        );
        assert_eq!(
            build("c", "5550100", "   ").unwrap_err(),
            ValidationError::MissingField("message")
        );
    }

    #[test]
    fn oversized_text_is_rejected() {
        let text = "a".repeat(MAX_TEXT_LEN + 1);
        assert!(matches!(
            build("c", "5550100", &text),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn serializes_camel_case() {
        let msg = build("cust-1", "5550100", "leak").unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["customerId"], "cust-1");
        assert_eq!(json["phoneNumber"], "5550100");
        assert_eq!(json["source"], "sms");
    }
}
