use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fingerprint::Fingerprint;

/// An independent category of automated check with its own trigger predicate
/// and debounce timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Spelling,
    Grammar,
    Style,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Spelling, Channel::Grammar, Channel::Style];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Spelling => "spelling",
            Channel::Grammar => "grammar",
            Channel::Style => "style",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical suggestion category. Provider taxonomies are folded into this set
/// at the normalization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Spelling,
    Grammar,
    Style,
    Punctuation,
    Typography,
    Other,
}

impl Category {
    /// Map a free-form provider label onto the canonical set.
    pub fn from_label(label: &str) -> Category {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "spelling" | "typos" | "typo" | "misspelling" | "spell" => Category::Spelling,
            "grammar" | "grammatical" | "agreement" | "verb" => Category::Grammar,
            "style" | "redundancy" | "clarity" | "wordiness" | "plain_english" => Category::Style,
            "punctuation" | "punct" | "comma" => Category::Punctuation,
            "typography" | "casing" | "capitalization" | "whitespace" => Category::Typography,
            _ => Category::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Spelling => "spelling",
            Category::Grammar => "grammar",
            Category::Style => "style",
            Category::Punctuation => "punctuation",
            Category::Typography => "typography",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open char range `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    /// Build a non-empty range, rejecting empty and inverted input.
    pub fn new(start: usize, end: usize) -> Result<Self, ValidationError> {
        match start.cmp(&end) {
            std::cmp::Ordering::Less => Ok(Self { start, end }),
            std::cmp::Ordering::Equal => Err(ValidationError::EmptyRange(start)),
            std::cmp::Ordering::Greater => Err(ValidationError::InvertedRange { start, end }),
        }
    }

    /// Re-check the invariant on a value that may have been built field-wise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(self.start, self.end).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Half-open overlap test.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlap test with both ranges widened by `tolerance` chars.
    pub fn near(&self, other: &TextRange, tolerance: usize) -> bool {
        self.start < other.end.saturating_add(tolerance)
            && other.start < self.end.saturating_add(tolerance)
    }

    pub fn distance_to(&self, offset: usize) -> usize {
        self.start.abs_diff(offset)
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Opaque suggestion identifier. Minted fresh for every analyzer run, so it is
/// never a stable identity for the underlying error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionId(String);

impl SuggestionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SuggestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SuggestionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SuggestionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionFlags {
    pub accepted: bool,
    pub dismissed: bool,
}

/// An annotation proposing a text edit, anchored to a char range of the
/// plain-text projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    pub document_id: String,
    pub version: u32,
    /// Analyzer channel that produced the suggestion.
    pub channel: Channel,
    pub category: Category,
    pub range: TextRange,
    /// Text at `range` when the suggestion was created.
    pub original_text: Option<String>,
    pub suggested_text: Option<String>,
    pub explanation: String,
    pub confidence: f32,
    #[serde(default)]
    pub flags: SuggestionFlags,
    /// Content identity computed against the text at creation time.
    #[serde(default)]
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(
        document_id: impl Into<String>,
        version: u32,
        channel: Channel,
        category: Category,
        range: TextRange,
    ) -> Self {
        Self {
            id: SuggestionId::new(),
            document_id: document_id.into(),
            version,
            channel,
            category,
            range,
            original_text: None,
            suggested_text: None,
            explanation: String::new(),
            confidence: 1.0,
            flags: SuggestionFlags::default(),
            fingerprint: Fingerprint::Unanchored,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<SuggestionId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_original(mut self, text: impl Into<String>) -> Self {
        self.original_text = Some(text.into());
        self
    }

    pub fn with_suggestion(mut self, text: impl Into<String>) -> Self {
        self.suggested_text = Some(text.into());
        self
    }

    pub fn with_explanation(mut self, text: impl Into<String>) -> Self {
        self.explanation = text.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Accepted or dismissed; either way no longer part of the active view.
    pub fn is_resolved(&self) -> bool {
        self.flags.accepted || self.flags.dismissed
    }

    /// Shape checks that do not need the document text.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        self.range.validate()?;
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::Confidence(self.confidence.to_string()));
        }
        if matches!(self.original_text.as_deref(), Some("")) {
            return Err(ValidationError::MissingField("original_text"));
        }
        Ok(())
    }
}
