//! Deterministic text normalization applied to the concatenated extract.

/// Lowercase, then collapse every whitespace run into a single space.
///
/// Leading/trailing runs collapse too; they are not trimmed.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut in_ws = false;
    for ch in lower.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}
