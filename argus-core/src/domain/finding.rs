//! Finding normalization
//!
//! A finding is one line of pipeline output. Lines are compared by exact
//! string match, so every producer and consumer goes through
//! [`normalize_finding`] first.

use std::collections::HashSet;

/// Collapses tab/space runs into a single space and trims the line
///
/// Returns `None` for lines that are blank after normalization.
pub fn normalize_finding(line: &str) -> Option<String> {
    let mut normalized = String::with_capacity(line.len());
    for word in line.split([' ', '\t']).filter(|w| !w.is_empty()) {
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        normalized.push_str(word);
    }
    let normalized = normalized.trim().to_string();

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalizes a raw output stream and drops repeats within it
///
/// First occurrence wins and stream order is kept. This is the intra-run
/// half of deduplication; history is consulted afterwards.
pub fn normalize_stream<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in lines {
        if let Some(finding) = normalize_finding(line.as_ref())
            && seen.insert(finding.clone())
        {
            out.push(finding);
        }
    }
    out
}
