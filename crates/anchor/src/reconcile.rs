//! Offset reconciliation primitives.
//!
//! The store drives these after every mutation: ranges are first mapped
//! through the edit, then checked against the new text. Spans that no longer
//! match their snapshot are re-found by exact text search when needed.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::MutationEvent;
use crate::error::{AnchorError, ValidationError};
use crate::text::{char_len, find_all, loose_key, slice_chars};
use crate::types::{Suggestion, TextRange};

/// Default widening, in chars, used when comparing two candidate edits.
pub const DEFAULT_DUPLICATE_TOLERANCE: usize = 10;

/// Where a stored range ends up after an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// The edit happened after the range.
    Untouched,
    /// The edit happened entirely before the range (a pure insertion at its
    /// start counts as before).
    Shifted(TextRange),
    /// The edit touched the range itself. The range is left in place for the
    /// validation pass to judge.
    Overlapped,
}

pub fn map_range(range: TextRange, event: &MutationEvent) -> Mapping {
    if event.old_end() <= range.start {
        if event.delta() == 0 {
            return Mapping::Untouched;
        }
        let start = (range.start as i64 + event.delta()).max(0) as usize;
        Mapping::Shifted(TextRange {
            start,
            end: start + range.len(),
        })
    } else if event.start >= range.end {
        Mapping::Untouched
    } else {
        Mapping::Overlapped
    }
}

/// Check a suggestion's range and snapshot against `text`.
pub fn check_anchor(suggestion: &Suggestion, text: &str) -> Result<(), ValidationError> {
    check_range(suggestion.range, suggestion.original_text.as_deref(), text)
}

pub fn check_range(
    range: TextRange,
    original_text: Option<&str>,
    text: &str,
) -> Result<(), ValidationError> {
    range.validate()?;
    let len = char_len(text);
    if range.end > len {
        return Err(ValidationError::OutOfBounds {
            start: range.start,
            end: range.end,
            len,
        });
    }
    if let Some(expected) = original_text {
        let found = slice_chars(text, range.start, range.end).unwrap_or_default();
        if found != expected {
            return Err(ValidationError::TextMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

/// Which occurrence wins when the target text appears more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    #[default]
    First,
    /// Closest to the hint offset; ties go to the earlier occurrence.
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Located {
    pub range: TextRange,
    pub occurrences: usize,
}

/// Find `target` in `text` by exact substring search.
pub fn locate_by_text(
    target: &str,
    text: &str,
    hint: Option<usize>,
    strategy: LocateStrategy,
) -> Result<Located, AnchorError> {
    let offsets = find_all(text, target);
    let first = *offsets
        .first()
        .ok_or_else(|| AnchorError::NotFound(target.to_string()))?;

    let start = match (strategy, hint) {
        (LocateStrategy::Nearest, Some(hint)) => offsets
            .iter()
            .copied()
            .min_by_key(|offset| offset.abs_diff(hint))
            .unwrap_or(first),
        _ => first,
    };

    if offsets.len() > 1 {
        warn!(
            target_text = target,
            occurrences = offsets.len(),
            chosen = start,
            strategy = ?strategy,
            "anchor_ambiguous"
        );
    }

    Ok(Located {
        range: TextRange {
            start,
            end: start + char_len(target),
        },
        occurrences: offsets.len(),
    })
}

/// The parts of a suggestion that decide whether two proposals are the same
/// edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditShape<'a> {
    pub range: TextRange,
    pub original_text: Option<&'a str>,
    pub suggested_text: Option<&'a str>,
}

impl<'a> From<&'a Suggestion> for EditShape<'a> {
    fn from(suggestion: &'a Suggestion) -> Self {
        Self {
            range: suggestion.range,
            original_text: suggestion.original_text.as_deref(),
            suggested_text: suggestion.suggested_text.as_deref(),
        }
    }
}

/// Two proposals are the same edit when they match exactly, or when their
/// ranges are within `tolerance` of each other and either the original text
/// (ignoring case and whitespace) or the suggested text agrees.
pub fn is_same_edit(a: &EditShape<'_>, b: &EditShape<'_>, tolerance: usize) -> bool {
    if a.range == b.range
        && a.original_text == b.original_text
        && a.suggested_text == b.suggested_text
    {
        return true;
    }
    if !a.range.near(&b.range, tolerance) {
        return false;
    }
    let same_original = match (a.original_text, b.original_text) {
        (Some(x), Some(y)) => loose_key(x) == loose_key(y),
        _ => false,
    };
    let same_suggestion = match (a.suggested_text, b.suggested_text) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    };
    same_original || same_suggestion
}
