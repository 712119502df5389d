//! Channel-name canonicalization shared by the lineup and the guide matcher

/// Canonical comparison key: surrounding whitespace trimmed, case folded.
///
/// Folding is locale independent (`str::to_lowercase`). No Unicode
/// normalization is applied, so visually equal names with different
/// combining sequences stay distinct.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Like [`normalize`] but drops keys that end up empty.
pub fn normalize_key(text: &str) -> Option<String> {
    let key = normalize(text);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
