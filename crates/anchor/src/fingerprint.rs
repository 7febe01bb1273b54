//! Content-addressed identity for flagged spans.
//!
//! Analyzer ids change on every run, so a dismissed error has to be recognised
//! by what it looks like instead: the flagged text plus a short window of
//! context on either side.
//!
//! # Algorithm
//!
//! ```text
//! key    = prefix(window chars) || "|" || original_text || "|" || suffix(window chars)
//! digest = SHA-256(FINGERPRINT_VERSION.to_be_bytes() || 0x02 || key_bytes) → hex
//! ```
//!
//! The version is folded into the digest so a change to the key layout never
//! matches fingerprints persisted by an older build.
//!
//! Two unrelated edits that share the same short phrase and the same context
//! collide. That is a known limit of the heuristic, not a bug.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::text::{char_len, slice_chars};
use crate::types::TextRange;

/// Bump whenever the key layout changes.
pub const FINGERPRINT_VERSION: u32 = 1;

/// Default context window on each side of the span.
pub const DEFAULT_WINDOW: usize = 10;

/// Fingerprint of a flagged span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "digest", rename_all = "snake_case")]
pub enum Fingerprint {
    /// Hex SHA-256 digest of the context key.
    Content(String),
    /// The span could not be resolved against the text; only id-based dedup
    /// applies.
    #[default]
    Unanchored,
}

impl Fingerprint {
    pub fn is_anchored(&self) -> bool {
        matches!(self, Fingerprint::Content(_))
    }

    pub fn digest(&self) -> Option<&str> {
        match self {
            Fingerprint::Content(digest) => Some(digest),
            Fingerprint::Unanchored => None,
        }
    }
}

/// Raw `prefix|original|suffix` key, or `None` when `range` is outside
/// `full_text`.
///
/// `original_text` falls back to the text currently at `range`.
pub fn fingerprint_key(
    range: TextRange,
    original_text: Option<&str>,
    full_text: &str,
    window: usize,
) -> Option<String> {
    let len = char_len(full_text);
    if range.is_empty() || range.end > len {
        return None;
    }
    let span = match original_text {
        Some(text) => text,
        None => slice_chars(full_text, range.start, range.end)?,
    };
    let prefix = slice_chars(full_text, range.start.saturating_sub(window), range.start)?;
    let suffix = slice_chars(full_text, range.end, range.end.saturating_add(window).min(len))?;
    Some(format!("{prefix}|{span}|{suffix}"))
}

/// Compute the fingerprint of a span against `full_text`.
pub fn compute_fingerprint(
    range: TextRange,
    original_text: Option<&str>,
    full_text: &str,
    window: usize,
) -> Fingerprint {
    match fingerprint_key(range, original_text, full_text, window) {
        Some(key) => Fingerprint::Content(hash_key(&key)),
        None => Fingerprint::Unanchored,
    }
}

fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.to_be_bytes());
    hasher.update([2u8]);
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
