//! Minimal HTML escaping for values interpolated into meta tags.
//!
//! Titles and summaries are user-supplied, so every value placed inside an
//! attribute or element body must pass through [`html_escape`] first.

/// Escape the five characters that can break out of HTML attribute or
/// element context: `&`, `<`, `>`, `"` and `'`.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
