//! Provider payload validation and normalization.
//!
//! Items are parsed into [`RawProviderMatch`] and folded into
//! [`NormalizedMatch`] against the exact text the request carried. Anything
//! that fails is reported per item and skipped.

use anchor::text::{char_len, slice_chars, utf16_to_char};
use anchor::{Category, Channel, TextRange, ValidationError};
use serde_json::Value;
use tracing::debug;

use crate::types::{
    GenericMatch, LanguageToolMatch, NormalizedMatch, ProviderResponse, RawProviderMatch,
    SpanMatch,
};

/// Outcome of normalizing one provider response.
#[derive(Debug, Default)]
pub struct NormalizeReport {
    pub matches: Vec<NormalizedMatch>,
    /// Index of each rejected item with the reason.
    pub skipped: Vec<(usize, ValidationError)>,
}

impl RawProviderMatch {
    pub fn parse(value: &Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::Malformed(format!(
                "expected object, got {value}"
            )));
        }
        serde_json::from_value(value.clone())
            .map_err(|_| ValidationError::Malformed("no known provider shape matched".into()))
    }

    /// Resolve against the request snapshot. `channel` supplies the category
    /// when the provider did not send one.
    pub fn normalize(&self, text: &str, channel: Channel) -> Result<NormalizedMatch, ValidationError> {
        match self {
            RawProviderMatch::LanguageTool(m) => normalize_language_tool(m, text, channel),
            RawProviderMatch::Span(m) => normalize_span(m, text, channel),
            RawProviderMatch::Generic(m) => normalize_generic(m, text, channel),
        }
    }
}

/// Parse and normalize every item, collecting failures instead of stopping.
pub fn normalize_response(
    response: &ProviderResponse,
    text: &str,
    channel: Channel,
) -> NormalizeReport {
    let mut report = NormalizeReport::default();
    for (idx, item) in response.items.iter().enumerate() {
        match RawProviderMatch::parse(item).and_then(|raw| raw.normalize(text, channel)) {
            Ok(normalized) => report.matches.push(normalized),
            Err(err) => {
                debug!(channel = %channel, index = idx, error = %err, "provider_item_skipped");
                report.skipped.push((idx, err));
            }
        }
    }
    report
}

pub fn channel_category(channel: Channel) -> Category {
    match channel {
        Channel::Spelling => Category::Spelling,
        Channel::Grammar => Category::Grammar,
        Channel::Style => Category::Style,
    }
}

fn resolve_category(label: Option<&str>, channel: Channel) -> Category {
    match label.map(Category::from_label) {
        Some(Category::Other) | None => channel_category(channel),
        Some(category) => category,
    }
}

fn bounded_range(start: usize, end: usize, text: &str) -> Result<TextRange, ValidationError> {
    let range = TextRange::new(start, end)?;
    let len = char_len(text);
    if range.end > len {
        return Err(ValidationError::OutOfBounds { start, end, len });
    }
    Ok(range)
}

fn snapshot(range: TextRange, text: &str) -> Result<String, ValidationError> {
    slice_chars(text, range.start, range.end)
        .map(str::to_string)
        .ok_or(ValidationError::OutOfBounds {
            start: range.start,
            end: range.end,
            len: char_len(text),
        })
}

fn normalize_language_tool(
    m: &LanguageToolMatch,
    text: &str,
    channel: Channel,
) -> Result<NormalizedMatch, ValidationError> {
    let utf16_end = m.offset.saturating_add(m.length);
    let out_of_bounds = || ValidationError::OutOfBounds {
        start: m.offset,
        end: utf16_end,
        len: char_len(text),
    };
    let start = utf16_to_char(text, m.offset).ok_or_else(out_of_bounds)?;
    let end = utf16_to_char(text, utf16_end).ok_or_else(out_of_bounds)?;
    let range = bounded_range(start, end, text)?;

    let label = m
        .rule
        .category
        .as_ref()
        .map(|category| category.id.as_str())
        .filter(|id| Category::from_label(id) != Category::Other)
        .or(m.rule.issue_type.as_deref());

    Ok(NormalizedMatch {
        range,
        original_text: snapshot(range, text)?,
        suggested_text: m.replacements.first().map(|r| r.value.clone()),
        explanation: m.message.clone(),
        category: resolve_category(label, channel),
        confidence: 1.0,
        rule_id: (!m.rule.id.is_empty()).then(|| m.rule.id.clone()),
    })
}

fn normalize_span(
    m: &SpanMatch,
    text: &str,
    channel: Channel,
) -> Result<NormalizedMatch, ValidationError> {
    let range = bounded_range(m.start, m.end, text)?;
    let found = snapshot(range, text)?;
    if let Some(original) = m.original.as_deref() {
        if original != found {
            return Err(ValidationError::TextMismatch {
                expected: original.to_string(),
                found,
            });
        }
    }

    let confidence = m.confidence.unwrap_or(1.0);
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(ValidationError::Confidence(confidence.to_string()));
    }

    Ok(NormalizedMatch {
        range,
        original_text: found,
        suggested_text: m.suggestion.clone(),
        explanation: m.explanation.clone(),
        category: resolve_category(m.kind.as_deref(), channel),
        confidence: confidence as f32,
        rule_id: None,
    })
}

fn normalize_generic(
    m: &GenericMatch,
    text: &str,
    channel: Channel,
) -> Result<NormalizedMatch, ValidationError> {
    let range = bounded_range(m.offset, m.offset.saturating_add(m.length), text)?;
    Ok(NormalizedMatch {
        range,
        original_text: snapshot(range, text)?,
        suggested_text: m.replacements.first().cloned(),
        explanation: m.message.clone(),
        category: resolve_category(m.category.as_deref(), channel),
        confidence: 1.0,
        rule_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT: &str = "I saw teh cat";

    #[test]
    fn language_tool_offsets_are_utf16() {
        // The emoji is two UTF-16 units, one char.
        let text = "😀 teh";
        let raw = RawProviderMatch::parse(&json!({
            "offset": 3, "length": 3, "message": "Possible spelling mistake",
            "replacements": [{"value": "the"}, {"value": "tech"}],
            "rule": {"id": "MORFOLOGIK_RULE_EN_US", "issueType": "misspelling",
                     "category": {"id": "TYPOS"}}
        }))
        .unwrap();
        let normalized = raw.normalize(text, Channel::Spelling).unwrap();
        assert_eq!(normalized.range, TextRange::new(2, 5).unwrap());
        assert_eq!(normalized.original_text, "teh");
        assert_eq!(normalized.suggested_text.as_deref(), Some("the"));
        assert_eq!(normalized.category, Category::Spelling);
        assert_eq!(normalized.rule_id.as_deref(), Some("MORFOLOGIK_RULE_EN_US"));
    }

    #[test]
    fn language_tool_falls_back_to_issue_type() {
        let raw = RawProviderMatch::parse(&json!({
            "offset": 6, "length": 3, "message": "m",
            "rule": {"id": "X", "issueType": "grammar", "category": {"id": "MISC"}}
        }))
        .unwrap();
        let normalized = raw.normalize(TEXT, Channel::Style).unwrap();
        assert_eq!(normalized.category, Category::Grammar);
        assert!(normalized.suggested_text.is_none());
    }

    #[test]
    fn span_snapshot_must_match_text() {
        let raw = RawProviderMatch::parse(&json!({
            "start": 6, "end": 9, "original": "tha", "suggestion": "the"
        }))
        .unwrap();
        assert!(matches!(
            raw.normalize(TEXT, Channel::Spelling),
            Err(ValidationError::TextMismatch { .. })
        ));
    }

    #[test]
    fn span_rejects_bad_confidence_and_empty_range() {
        let raw = RawProviderMatch::parse(&json!({
            "start": 6, "end": 9, "suggestion": "the", "confidence": 3.0
        }))
        .unwrap();
        assert!(matches!(
            raw.normalize(TEXT, Channel::Spelling),
            Err(ValidationError::Confidence(_))
        ));

        let raw = RawProviderMatch::parse(&json!({"start": 4, "end": 4})).unwrap();
        assert_eq!(
            raw.normalize(TEXT, Channel::Spelling),
            Err(ValidationError::EmptyRange(4))
        );
    }

    #[test]
    fn unknown_category_uses_channel_default() {
        let raw = RawProviderMatch::parse(&json!({
            "offset": 6, "length": 3, "replacements": ["the"], "category": "weird"
        }))
        .unwrap();
        let normalized = raw.normalize(TEXT, Channel::Grammar).unwrap();
        assert_eq!(normalized.category, Category::Grammar);
    }

    #[test]
    fn one_bad_item_does_not_sink_the_batch() {
        let mut items: Vec<Value> = (0..9)
            .map(|_| json!({"start": 6, "end": 9, "original": "teh", "suggestion": "the"}))
            .collect();
        items.insert(4, json!({"start": "six", "end": 9}));
        let report = normalize_response(&ProviderResponse::new(items), TEXT, Channel::Spelling);
        assert_eq!(report.matches.len(), 9);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 4);
    }

    #[test]
    fn out_of_bounds_items_are_rejected() {
        let raw = RawProviderMatch::parse(&json!({"offset": 10, "length": 9})).unwrap();
        assert!(matches!(
            raw.normalize(TEXT, Channel::Spelling),
            Err(ValidationError::OutOfBounds { .. })
        ));
        assert!(RawProviderMatch::parse(&json!(42)).is_err());
    }
}
