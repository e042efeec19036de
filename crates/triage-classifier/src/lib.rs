//! # triage-classifier — Keyword Triage
//!
//! Maps raw message text to a [`TriageResult`]. The function is pure,
//! deterministic and total: it never fails, and empty or unrecognised text
//! yields `ROUTINE` / `GENERAL` / no dispatch.
//!
//! ## Rules
//!
//! - **Category**: case-insensitive substring match against the category
//!   keyword sets in [`CATEGORY_KEYWORDS`]. The sets are checked in their
//!   declared order (HVAC, PLUMBING, ELECTRICAL) and the first set with a
//!   hit wins, so `"no heat and a leak"` is HVAC.
//! - **Priority**: `EMERGENCY` if any of [`EMERGENCY_KEYWORDS`] matches,
//!   regardless of category; else `URGENT` if any of [`URGENT_KEYWORDS`]
//!   matches; else `ROUTINE`.
//! - **Dispatch**: required exactly when the priority is `EMERGENCY`.
//! - **Response window**: fixed per priority (see
//!   [`Priority::response_window`]).
//!
//! ## Crate Policy
//!
//! - Depends only on `triage-core`.
//! - The keyword tables are the single source of truth; reordering
//!   [`CATEGORY_KEYWORDS`] changes classification and must be treated as a
//!   behavioural change.

pub mod keywords;

pub use keywords::{CATEGORY_KEYWORDS, EMERGENCY_KEYWORDS, URGENT_KEYWORDS};

use triage_core::{Category, Priority, TriageResult};

/// Classify message text.
pub fn classify(text: &str) -> TriageResult {
    let lowered = text.to_lowercase();

    let category_hit = CATEGORY_KEYWORDS
        .iter()
        .find_map(|(category, words)| first_match(&lowered, words).map(|kw| (*category, kw)));

    let (priority, priority_keyword) = if let Some(kw) = first_match(&lowered, EMERGENCY_KEYWORDS) {
        (Priority::Emergency, Some(kw))
    } else if let Some(kw) = first_match(&lowered, URGENT_KEYWORDS) {
        (Priority::Urgent, Some(kw))
    } else {
        (Priority::Routine, None)
    };

    let category = category_hit.map_or(Category::General, |(c, _)| c);

    TriageResult {
        priority,
        category,
        dispatch_required: priority == Priority::Emergency,
        estimated_response: priority.response_window(),
        notes: notes(priority, priority_keyword, category_hit),
    }
}

/// First keyword (in table order) contained in `haystack`.
fn first_match(haystack: &str, words: &[&'static str]) -> Option<&'static str> {
    words.iter().copied().find(|kw| haystack.contains(kw))
}

fn notes(
    priority: Priority,
    priority_keyword: Option<&str>,
    category_hit: Option<(Category, &str)>,
) -> String {
    let priority_part = match (priority, priority_keyword) {
        (Priority::Emergency, Some(kw)) => format!("emergency keyword \"{kw}\""),
        (Priority::Urgent, Some(kw)) => format!("urgency keyword \"{kw}\""),
        _ => "no urgency keyword".to_string(),
    };
    let category_part = match category_hit {
        Some((category, kw)) => format!("category {category} via \"{kw}\""),
        None => "no category keyword".to_string(),
    };
    format!("{priority_part}; {category_part}")
}
