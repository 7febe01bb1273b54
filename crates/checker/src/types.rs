use anchor::{Category, Channel, TextRange};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

/// A single check over the full text of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub text: String,
    pub language: String,
    pub channel: Channel,
    /// Per-channel revision the response will be matched against.
    pub revision: u64,
}

impl CheckRequest {
    pub fn new(channel: Channel, revision: u64, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: "en-US".to_string(),
            channel,
            revision,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Raw items as the provider sent them; validated one by one later so a
/// single bad item never sinks the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub items: Vec<Value>,
}

impl ProviderResponse {
    pub fn new(items: Vec<Value>) -> Self {
        Self { items }
    }

    /// Accepts a bare array or an object carrying a `matches` array.
    pub fn from_value(value: Value) -> Result<Self, ProviderError> {
        match value {
            Value::Array(items) => Ok(Self { items }),
            Value::Object(mut map) => match map.remove("matches") {
                Some(Value::Array(items)) => Ok(Self { items }),
                Some(other) => Err(ProviderError::Parse(format!(
                    "`matches` must be an array, got {}",
                    json_kind(&other)
                ))),
                None => Err(ProviderError::Parse(
                    "response object has no `matches` field".into(),
                )),
            },
            other => Err(ProviderError::Parse(format!(
                "expected array or object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtReplacement {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtCategory {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtRule {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "issueType", default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub category: Option<LtCategory>,
}

/// LanguageTool `/v2/check` match. Offsets count UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageToolMatch {
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub replacements: Vec<LtReplacement>,
    pub rule: LtRule,
}

/// Span-style item with explicit char offsets and snapshot text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanMatch {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Offset/length item with plain-string replacements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericMatch {
    pub offset: usize,
    pub length: usize,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub replacements: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Every provider payload shape the engine understands. Variants are tried in
/// order, so the LanguageTool shape (which requires `rule`) comes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawProviderMatch {
    LanguageTool(LanguageToolMatch),
    Span(SpanMatch),
    Generic(GenericMatch),
}

/// Provider match in engine terms: char offsets, snapshot text, canonical
/// category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMatch {
    pub range: TextRange,
    /// Text at `range` in the request snapshot.
    pub original_text: String,
    pub suggested_text: Option<String>,
    pub explanation: String,
    pub category: Category,
    pub confidence: f32,
    #[serde(default)]
    pub rule_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_accepts_array_or_matches_object() {
        let bare = ProviderResponse::from_value(json!([{"start": 0, "end": 1}])).unwrap();
        assert_eq!(bare.items.len(), 1);

        let wrapped =
            ProviderResponse::from_value(json!({"software": {}, "matches": [{}, {}]})).unwrap();
        assert_eq!(wrapped.items.len(), 2);

        assert!(matches!(
            ProviderResponse::from_value(json!({"results": []})),
            Err(ProviderError::Parse(_))
        ));
        assert!(ProviderResponse::from_value(json!("nope")).is_err());
    }

    #[test]
    fn untagged_variants_resolve_by_shape() {
        let lt: RawProviderMatch = serde_json::from_value(json!({
            "offset": 4, "length": 3, "message": "Possible typo",
            "replacements": [{"value": "the"}],
            "rule": {"id": "MORFOLOGIK_RULE_EN_US", "issueType": "misspelling",
                     "category": {"id": "TYPOS"}}
        }))
        .unwrap();
        assert!(matches!(lt, RawProviderMatch::LanguageTool(_)));

        let span: RawProviderMatch = serde_json::from_value(json!({
            "start": 0, "end": 3, "original": "teh", "suggestion": "the", "type": "spelling"
        }))
        .unwrap();
        assert!(matches!(span, RawProviderMatch::Span(_)));

        let generic: RawProviderMatch = serde_json::from_value(json!({
            "offset": 0, "length": 3, "replacements": ["the"], "category": "typo"
        }))
        .unwrap();
        assert!(matches!(generic, RawProviderMatch::Generic(_)));
    }

    #[test]
    fn request_defaults_to_us_english() {
        let req = CheckRequest::new(Channel::Grammar, 3, "text");
        assert_eq!(req.language, "en-US");
        assert_eq!(req.with_language("de-DE").language, "de-DE");
    }
}
