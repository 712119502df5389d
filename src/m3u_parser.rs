//! M3U playlist indexing
//!
//! Only the keys used for guide matching are extracted: the `tvg-id`
//! attribute and the display text after the entry's last top-level comma.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::normalize::normalize_key;

const ENTRY_MARKER: &str = "#EXTINF";
const IDENTIFIER_ATTR: &str = "tvg-id";

/// Known channel keys taken from the playlist. Built once, read-only after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineupIndex {
    /// Normalized `tvg-id` values
    pub identifiers: HashSet<String>,
    /// Normalized display texts
    pub display_names: HashSet<String>,
}

impl LineupIndex {
    /// Build the index from raw playlist text
    pub fn from_text(content: &str) -> Self {
        let mut index = LineupIndex::default();

        for line in content.lines() {
            let line = line.trim().trim_start_matches('\u{feff}');
            if !line.starts_with(ENTRY_MARKER) {
                continue;
            }

            let info_part = line[ENTRY_MARKER.len()..].trim_start_matches(':');
            let (attr_part, display_text) = split_display_text(info_part);

            let attrs = extract_attrs(attr_part);
            if let Some(id) = attrs.get(IDENTIFIER_ATTR).and_then(|v| normalize_key(v)) {
                index.identifiers.insert(id);
            }
            if let Some(name) = display_text.and_then(normalize_key) {
                index.display_names.insert(name);
            }
        }

        index
    }

    /// Build the index from fetched playlist bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_text(&String::from_utf8_lossy(bytes))
    }

    pub fn contains_identifier(&self, key: &str) -> bool {
        self.identifiers.contains(key)
    }

    pub fn contains_display_name(&self, key: &str) -> bool {
        self.display_names.contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.display_names.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            "Lineup indexed: {} unique tvg-ids, {} unique channel names",
            self.identifiers.len(),
            self.display_names.len()
        );
    }
}

/// Split an EXTINF body at its last comma that is not inside a quoted
/// attribute value. Falls back to the last comma when quotes are unbalanced.
fn split_display_text(info: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    let mut split = None;

    for (i, c) in info.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => split = Some(i),
            _ => {}
        }
    }

    if in_quotes {
        split = info.rfind(',');
    }

    match split {
        Some(pos) => (&info[..pos], Some(&info[pos + 1..])),
        None => (info, None),
    }
}

/// Extract `key=value` attributes - handles quoted and unquoted values.
/// Keys are lowercased; the first occurrence of a key wins.
fn extract_attrs(info: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = info;

    while let Some(eq) = rest.find('=') {
        // The key is the last token before '=' (skips the leading duration)
        let key = rest[..eq]
            .rsplit(|c: char| c.is_whitespace() || c == ',')
            .next()
            .unwrap_or_default()
            .trim_matches('"')
            .to_ascii_lowercase();

        let after = &rest[eq + 1..];
        let (value, consumed) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], end + 2),
                None => (quoted, after.len()),
            },
            None => {
                let end = after
                    .find(|c: char| c.is_whitespace() || c == ',')
                    .unwrap_or(after.len());
                (&after[..end], end)
            }
        };

        if !key.is_empty() {
            attrs.entry(key).or_insert_with(|| value.to_string());
        }
        rest = &after[consumed..];
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_display_text_ignores_quoted_commas() {
        let (attrs, name) = split_display_text(r#"-1 group-title="News, Sports",BBC One"#);
        assert_eq!(attrs, r#"-1 group-title="News, Sports""#);
        assert_eq!(name, Some("BBC One"));
    }

    #[test]
    fn test_split_display_text_without_comma() {
        let (attrs, name) = split_display_text(r#"-1 tvg-id="cnn""#);
        assert_eq!(attrs, r#"-1 tvg-id="cnn""#);
        assert_eq!(name, None);
    }

    #[test]
    fn test_extract_attrs_quoted_and_unquoted() {
        let attrs = extract_attrs(r#"-1 tvg-id=unquoted TVG-Logo="http://x/y.png?a=b" group-title="G""#);
        assert_eq!(attrs.get("tvg-id"), Some(&"unquoted".to_string()));
        assert_eq!(attrs.get("tvg-logo"), Some(&"http://x/y.png?a=b".to_string()));
        assert_eq!(attrs.get("group-title"), Some(&"G".to_string()));
    }

    #[test]
    fn test_extract_attrs_after_duration_comma() {
        let attrs = extract_attrs(r#"10.000000,TVG-ID="Channel1" tvg-name="Channel 1""#);
        assert_eq!(attrs.get("tvg-id"), Some(&"Channel1".to_string()));
        assert_eq!(attrs.get("tvg-name"), Some(&"Channel 1".to_string()));
    }
}
