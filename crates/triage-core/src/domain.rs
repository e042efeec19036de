//! # Triage Vocabulary
//!
//! The closed sets the classifier maps free text into: [`Priority`],
//! [`Category`], the inbound [`MessageSource`], and the fixed
//! [`ResponseWindow`] promised to the customer for each priority.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Urgency of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// A live technician must be paged now.
    Emergency,
    /// Same-day attention, no page.
    Urgent,
    /// Scheduled follow-up.
    Routine,
}

impl Priority {
    /// Return the canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Urgent => "URGENT",
            Self::Routine => "ROUTINE",
        }
    }

    /// The response window promised to the customer for this priority.
    pub fn response_window(&self) -> ResponseWindow {
        match self {
            Self::Emergency => ResponseWindow::from_minutes(15, 30),
            Self::Urgent => ResponseWindow::from_minutes(2 * 60, 4 * 60),
            Self::Routine => ResponseWindow::from_minutes(24 * 60, 48 * 60),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of variants in [`Category`].
pub const CATEGORY_COUNT: usize = 4;

/// Trade a message concerns. Technicians are rostered per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Heating, ventilation and air conditioning.
    Hvac,
    /// Water supply, drains, sewage.
    Plumbing,
    /// Power, wiring, breakers.
    Electrical,
    /// Nothing more specific matched.
    General,
}

impl Category {
    /// All categories in declaration order.
    pub fn all() -> [Category; CATEGORY_COUNT] {
        [Self::Hvac, Self::Plumbing, Self::Electrical, Self::General]
    }

    /// Return the canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hvac => "HVAC",
            Self::Plumbing => "PLUMBING",
            Self::Electrical => "ELECTRICAL",
            Self::General => "GENERAL",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HVAC" => Ok(Self::Hvac),
            "PLUMBING" => Ok(Self::Plumbing),
            "ELECTRICAL" => Ok(Self::Electrical),
            "GENERAL" => Ok(Self::General),
            _ => Err(ValidationError::UnknownCategory(s.to_string())),
        }
    }
}

/// Channel an inbound message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// Phone call transcript fragment.
    Phone,
    /// SMS text.
    Sms,
    /// WhatsApp message.
    Whatsapp,
    /// Web chat line.
    Web,
}

impl MessageSource {
    /// Return the canonical lower-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Sms => "sms",
            Self::Whatsapp => "whatsapp",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(Self::Phone),
            "sms" => Ok(Self::Sms),
            "whatsapp" => Ok(Self::Whatsapp),
            "web" => Ok(Self::Web),
            _ => Err(ValidationError::UnknownSource(s.to_string())),
        }
    }
}

/// Promised response time range, stored in whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseWindow {
    /// Lower bound in minutes.
    pub min_minutes: u32,
    /// Upper bound in minutes.
    pub max_minutes: u32,
}

impl ResponseWindow {
    /// Build a window from minute bounds.
    pub const fn from_minutes(min_minutes: u32, max_minutes: u32) -> Self {
        Self {
            min_minutes,
            max_minutes,
        }
    }
}

/// Renders `"15-30 minutes"` or, when both bounds are whole hours,
/// `"2-4 hours"`.
impl fmt::Display for ResponseWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole_hours = self.min_minutes >= 60
            && self.min_minutes % 60 == 0
            && self.max_minutes % 60 == 0;
        if whole_hours {
            write!(
                f,
                "{}-{} hours",
                self.min_minutes / 60,
                self.max_minutes / 60
            )
        } else {
            write!(f, "{}-{} minutes", self.min_minutes, self.max_minutes)
        }
    }
}
