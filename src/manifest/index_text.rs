//! Parser for the manifest index text.
//!
//! The extracted index is plain text, one `key,token` pair per line. Tokens
//! are opaque (commonly content hashes) and only ever compared for equality.

use std::collections::BTreeMap;

/// Parse index text into a key -> version-token mapping.
///
/// Each line is split on the first comma, both sides trimmed. Blank lines,
/// lines without a comma, and lines with an empty key are skipped.
pub fn parse_index_text(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((key, token)) = line.split_once(',') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        out.insert(key.to_string(), token.trim().to_string());
    }
    out
}
