//! Query sanitization: normalization, length enforcement, and prompt
//! injection detection. Runs before any query reaches the retrieval or
//! answer path.

use regex::RegexSet;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Patterns indicating an attempt to steer the answer model rather than ask
/// a question: instruction overrides, role takeovers, prompt exfiltration.
/// A match is reported to the caller, never silently passed through.
static INJECTION_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)ignore\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions|prompts|messages|rules)",
        r"(?i)disregard\s+(all\s+|any\s+)?(previous|prior|above|earlier)\s+(instructions|prompts|messages|rules)",
        r"(?i)forget\s+(everything|all|your)\s+(you|instructions|rules)",
        r"(?i)system\s+prompt\s*:",
        r"(?i)\bnew\s+instructions\s*:",
        r"(?i)you\s+are\s+now\s+(a|an|the)\b",
        r"(?i)\bact\s+as\s+(the\s+)?(system|developer|admin(istrator)?)\b",
        r"(?i)\bpretend\s+(to\s+be|you\s+are)\b",
        r"(?i)(reveal|print|show|repeat|output)\s+(your|the)\s+(system\s+)?(prompt|instructions)",
        r"(?i)(exfiltrate|leak)\b",
        r"(?i)\bsend\s+.{0,40}\s+to\s+https?://",
    ])
    .expect("injection pattern set must compile")
});

/// Normalizes and validates a raw user query.
///
/// - Unicode NFKC normalization
/// - control characters stripped (tabs and newlines become spaces)
/// - surrounding whitespace trimmed
/// - length enforced in characters (`InvalidQuery` beyond `max_length`)
/// - injection patterns rejected (`SuspiciousQuery`, logged as a security
///   event; callers may still choose to soft-fail with a generic answer)
pub fn sanitize_query(raw: &str, max_length: usize) -> Result<String> {
    let normalized: String = raw
        .nfkc()
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    let query = normalized.trim().to_string();

    if query.is_empty() {
        return Err(Error::InvalidQuery("Query cannot be empty".to_string()));
    }

    let length = query.chars().count();
    if length > max_length {
        return Err(Error::InvalidQuery(format!(
            "Query is too long ({} characters, maximum {})",
            length, max_length
        )));
    }

    if INJECTION_PATTERNS.is_match(&query) {
        tracing::warn!(
            security_event = "prompt_injection_detected",
            query_length = length,
            "Rejected suspicious query"
        );
        return Err(Error::SuspiciousQuery(
            "Query matched an injection pattern".to_string(),
        ));
    }

    Ok(query)
}
