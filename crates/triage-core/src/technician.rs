//! # Technicians
//!
//! A rostered technician. The roster is owned outside the coordinator;
//! this crate only describes its shape and normalizes phone numbers so
//! inbound replies can be matched to a roster entry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::Category;
use crate::error::ValidationError;
use crate::identity::TechnicianId;

/// A technician on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    /// Normalized phone number used for pages and reply matching.
    pub phone: String,
    pub categories: BTreeSet<Category>,
    pub on_call: bool,
}

impl Technician {
    /// Build a validated technician.
    pub fn new(
        id: TechnicianId,
        name: impl Into<String>,
        phone: &str,
        categories: impl IntoIterator<Item = Category>,
        on_call: bool,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        let categories: BTreeSet<Category> = categories.into_iter().collect();
        if categories.is_empty() {
            return Err(ValidationError::MissingField("categories"));
        }
        Ok(Self {
            id,
            name,
            phone: normalize_phone(phone)?,
            categories,
            on_call,
        })
    }

    /// Whether this technician can be paged for `category` right now.
    pub fn serves(&self, category: Category) -> bool {
        self.on_call && self.categories.contains(&category)
    }
}

/// Normalize a phone number to its digits, keeping a leading `+`.
///
/// Spaces, dashes, dots and parentheses are dropped. Any other character,
/// or a number without digits, is rejected.
pub fn normalize_phone(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    for (i, c) in trimmed.chars().enumerate() {
        match c {
            '0'..='9' => out.push(c),
            '+' if i == 0 => out.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(ValidationError::InvalidPhone(raw.to_string())),
        }
    }
    if !out.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidPhone(raw.to_string()));
    }
    Ok(out)
}
