//! Lenient numeric parsing for spreadsheet cells and indicator observations.

/// Placeholder the indicator source emits for unavailable data points.
pub const UNAVAILABLE_PLACEHOLDER: &str = ".";

/// Parse a cell as a floating point number.
///
/// Tolerates surrounding whitespace and thousands separators ("1,300.50").
/// The indicator placeholder and empty cells yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == UNAVAILABLE_PLACEHOLDER {
        return None;
    }
    let normalized: String = trimmed.chars().filter(|ch| *ch != ',').collect();
    normalized.parse::<f64>().ok()
}

/// Parse a cell as the literal boolean text "true" (case-insensitive).
pub fn parse_bool_literal(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}
