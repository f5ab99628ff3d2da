//! Name canonicalization.
//!
//! Feeds decorate the same node differently over time ("🇭🇰 HK-01",
//! "HK 01", "hk—01"). Identity comparisons go through [`key`] so those
//! spellings collapse to one endpoint.

use regex::Regex;
use std::sync::LazyLock;

static DECORATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[",
        r"\p{Extended_Pictographic}",
        r"\p{Emoji_Modifier}",
        r"\p{Regional_Indicator}",
        r"\p{Variation_Selector}",
        r"\u{200D}\u{20E3}",
        r"\s",
        r"\-\u{2010}-\u{2015}\u{2212}",
        r"]+",
    ))
    .expect("decoration pattern is valid")
});

/// Normalization key of a display name.
///
/// Strips pictographic symbols, whitespace and dash punctuation, then
/// lower-cases what is left. `key(&key(n)) == key(n)` for every `n`.
pub fn key(name: &str) -> String {
    DECORATION.replace_all(name, "").to_lowercase()
}

/// Key used to identify an endpoint name.
///
/// Names made only of decoration have an empty key; those fall back to the
/// literal name so unrelated decoration-only names don't collide.
pub fn identity(name: &str) -> String {
    let key = key(name);
    if key.is_empty() {
        name.to_string()
    } else {
        key
    }
}
