//! Field normalizer: pure text cleanup helpers.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

/// Collapses whitespace runs to a single space and trims both ends.
///
/// Returns `None` for missing input and for input that is empty once
/// cleaned. `clean(clean(x)) == clean(x)`.
pub fn clean(text: Option<&str>) -> Option<String> {
    let text = text?;
    let collapsed = WHITESPACE_RUN.replace_all(text, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Joins two optional fragments with `". "`.
///
/// Falls back to whichever side is present. Order matters: `a` comes first.
pub fn merge(a: Option<String>, b: Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) => Some(format!("{a}. {b}")),
        (a, b) => a.or(b),
    }
}
