//! Offline provider backed by a phrase table.
//!
//! Deterministic and fast, which makes it the provider of choice for the demo
//! binary and for tests. Matching is ASCII case-insensitive and respects word
//! boundaries; items come back in the span shape with char offsets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use anchor::text::{char_at, char_len, find_all, slice_chars};
use anchor::Category;

use crate::error::ProviderError;
use crate::provider::CheckerProvider;
use crate::types::{CheckRequest, ProviderResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub phrase: String,
    pub replacement: String,
    pub category: Category,
    #[serde(default)]
    pub explanation: String,
}

impl DictionaryEntry {
    pub fn new(phrase: &str, replacement: &str, category: Category) -> Self {
        Self {
            phrase: phrase.to_string(),
            replacement: replacement.to_string(),
            category,
            explanation: format!("Did you mean \"{replacement}\"?"),
        }
    }
}

const MISSPELLINGS: &[(&str, &str)] = &[
    ("teh", "the"),
    ("recieve", "receive"),
    ("misspeled", "misspelled"),
    ("grammer", "grammar"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("occured", "occurred"),
    ("untill", "until"),
    ("wich", "which"),
    ("accomodate", "accommodate"),
];

const GRAMMAR: &[(&str, &str)] = &[
    ("could of", "could have"),
    ("should of", "should have"),
    ("would of", "would have"),
    ("a apple", "an apple"),
    ("he don't", "he doesn't"),
    ("she don't", "she doesn't"),
];

const STYLE: &[(&str, &str)] = &[
    ("in order to", "to"),
    ("very unique", "unique"),
    ("at this point in time", "now"),
    ("due to the fact that", "because"),
];

#[derive(Debug, Clone)]
pub struct DictionaryProvider {
    id: String,
    entries: Vec<DictionaryEntry>,
    latency: Duration,
}

impl DictionaryProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: Vec::new(),
            latency: Duration::ZERO,
        }
    }

    pub fn spelling() -> Self {
        Self::from_table("dictionary-spelling", MISSPELLINGS, Category::Spelling)
    }

    pub fn grammar() -> Self {
        Self::from_table("dictionary-grammar", GRAMMAR, Category::Grammar)
    }

    pub fn style() -> Self {
        Self::from_table("dictionary-style", STYLE, Category::Style)
    }

    fn from_table(id: &str, table: &[(&str, &str)], category: Category) -> Self {
        table.iter().fold(Self::new(id), |provider, (phrase, replacement)| {
            provider.with_entry(DictionaryEntry::new(phrase, replacement, category))
        })
    }

    pub fn with_entry(mut self, entry: DictionaryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Simulated round-trip time, slept before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    /// Char ranges of every whole-word, case-insensitive occurrence.
    fn occurrences(text: &str, lowered: &str, phrase: &str) -> Vec<(usize, usize)> {
        let needle = phrase.to_ascii_lowercase();
        let len = char_len(&needle);
        let is_word = |idx: Option<usize>| {
            idx.and_then(|i| char_at(text, i))
                .is_some_and(|c| c.is_alphanumeric() || c == '\'')
        };
        find_all(lowered, &needle)
            .into_iter()
            .filter(|&start| !is_word(start.checked_sub(1)) && !is_word(Some(start + len)))
            .map(|start| (start, start + len))
            .collect()
    }

    /// Match every entry against `text`, sorted by position.
    pub fn scan(&self, text: &str) -> ProviderResponse {
        let lowered = text.to_ascii_lowercase();
        let mut hits = Vec::new();
        for entry in &self.entries {
            for (start, end) in Self::occurrences(text, &lowered, &entry.phrase) {
                let Some(original) = slice_chars(text, start, end) else {
                    continue;
                };
                hits.push((
                    start,
                    json!({
                        "start": start,
                        "end": end,
                        "original": original,
                        "suggestion": match_case(original, &entry.replacement),
                        "explanation": entry.explanation,
                        "type": entry.category,
                        "confidence": 0.9,
                    }),
                ));
            }
        }
        hits.sort_by_key(|(start, _)| *start);
        ProviderResponse::new(hits.into_iter().map(|(_, item)| item).collect())
    }
}

/// Carry a leading capital over to the replacement.
fn match_case(original: &str, replacement: &str) -> String {
    let starts_upper = original.chars().next().is_some_and(char::is_uppercase);
    if !starts_upper {
        return replacement.to_string();
    }
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[async_trait]
impl CheckerProvider for DictionaryProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn check(&self, request: &CheckRequest) -> Result<ProviderResponse, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.scan(&request.text))
    }
}
