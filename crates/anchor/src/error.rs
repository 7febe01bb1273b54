//! Error types produced by the anchor crate.
//!
//! Two families live here:
//!
//! | Error | Raised when |
//! |-------|-------------|
//! | [`ValidationError`] | A suggestion or provider item is malformed and must be skipped |
//! | [`AnchorError`] | An edit or a text search cannot be resolved against the document |
//!
//! Validation errors are always local: callers log them and move on to the
//! next item. Anchor errors surface to whoever asked for the edit or search.
use thiserror::Error;

/// A suggestion (or a provider item on its way to becoming one) failed a
/// boundary check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// `start == end`; zero-width suggestions are never stored.
    #[error("empty range at offset {0}")]
    EmptyRange(usize),
    /// `start > end`.
    #[error("inverted range {start}..{end}")]
    InvertedRange { start: usize, end: usize },
    /// The range ends past the end of the text it was checked against.
    #[error("range {start}..{end} exceeds text length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    /// The stored original text does not match the text at the range.
    #[error("original text {expected:?} does not match {found:?}")]
    TextMismatch { expected: String, found: String },
    /// Confidence must be a finite value in `[0, 1]`.
    #[error("confidence {0} outside [0, 1]")]
    Confidence(String),
    /// A required field was absent or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// The item did not match any known provider shape.
    #[error("malformed item: {0}")]
    Malformed(String),
}

/// Edits and searches that cannot be resolved against the current text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnchorError {
    /// Exact-text search found no occurrence.
    #[error("text {0:?} not found in document")]
    NotFound(String),
    /// An offset lies past the end of the document.
    #[error("offset {offset} exceeds document length {len}")]
    OutOfBounds { offset: usize, len: usize },
    /// An edit with `start > end`.
    #[error("invalid edit {start}..{end}")]
    InvalidEdit { start: usize, end: usize },
}
