//! # Keyword Tables
//!
//! All keywords are lower case; the classifier lowercases the message
//! before matching.

use triage_core::Category;

/// Heating, ventilation and air conditioning.
pub const HVAC_KEYWORDS: &[&str] = &[
    "no heat",
    "furnace",
    "heater",
    "heating",
    "heat pump",
    "boiler",
    "thermostat",
    "air conditioning",
    "air conditioner",
    "a/c",
    "hvac",
    "carbon monoxide",
    "ventilation",
];

/// Water supply, drains and sewage.
pub const PLUMBING_KEYWORDS: &[&str] = &[
    "burst pipe",
    "pipe burst",
    "leak",
    "flood",
    "water main",
    "no water",
    "sewage",
    "sewer",
    "toilet",
    "drain",
    "clog",
    "pipe",
];

/// Power, wiring and breakers.
pub const ELECTRICAL_KEYWORDS: &[&str] = &[
    "power outage",
    "no power",
    "sparking",
    "sparks",
    "exposed wire",
    "wiring",
    "breaker",
    "fuse",
    "outlet",
    "electrical",
    "electric",
    "flickering",
];

/// Category keyword sets in precedence order. The first set with a hit
/// determines the category.
pub const CATEGORY_KEYWORDS: [(Category, &[&str]); 3] = [
    (Category::Hvac, HVAC_KEYWORDS),
    (Category::Plumbing, PLUMBING_KEYWORDS),
    (Category::Electrical, ELECTRICAL_KEYWORDS),
];

/// Any hit makes the message an emergency, whatever its category.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "emergency",
    "no heat",
    "burst pipe",
    "pipe burst",
    "flooding",
    "flooded",
    "gas leak",
    "smell gas",
    "gas smell",
    "carbon monoxide",
    "sparking",
    "sparks",
    "exposed wire",
    "electrical shock",
    "no power",
    "fire",
    "smoke",
    "sewage backup",
    "no water",
    "broken",
    "not working",
];

/// Same-day urgency markers, consulted only when no emergency keyword hit.
pub const URGENT_KEYWORDS: &[&str] = &["urgent", "today"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_lower_case() {
        let all = CATEGORY_KEYWORDS
            .iter()
            .flat_map(|(_, words)| words.iter())
            .chain(EMERGENCY_KEYWORDS)
            .chain(URGENT_KEYWORDS);
        for kw in all {
            assert_eq!(*kw, kw.to_lowercase(), "keyword {kw:?} must be lower case");
        }
    }

    #[test]
    fn category_order_is_hvac_plumbing_electrical() {
        let order: Vec<Category> = CATEGORY_KEYWORDS.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            order,
            vec![Category::Hvac, Category::Plumbing, Category::Electrical]
        );
    }
}
