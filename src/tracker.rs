//! Remembers what the user dismissed, by id and by content.
//!
//! Suggestion ids are minted fresh on every provider run, so an id alone
//! would let a dismissed suggestion come straight back on the next check.
//! The tracker also keeps the content fingerprint of each dismissed span and
//! matches new candidates against it.

use std::collections::HashSet;

use anchor::{compute_fingerprint, Fingerprint, Suggestion, SuggestionId, DEFAULT_WINDOW};
use chrono::Utc;
use tracing::debug;

use crate::persistence::DismissalRecord;

#[derive(Debug, Clone)]
pub struct DismissalTracker {
    dismissed_ids: HashSet<SuggestionId>,
    fingerprints: HashSet<String>,
    processed: HashSet<SuggestionId>,
    window: usize,
}

impl Default for DismissalTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl DismissalTracker {
    pub fn new(window: usize) -> Self {
        Self {
            dismissed_ids: HashSet::new(),
            fingerprints: HashSet::new(),
            processed: HashSet::new(),
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Record a dismissal. Returns the record to persist the first time an
    /// id is seen, `None` afterwards.
    ///
    /// Uses the fingerprint captured at creation; falls back to computing it
    /// against `full_text` for suggestions that never had one.
    pub fn record_dismissal(
        &mut self,
        suggestion: &Suggestion,
        full_text: &str,
    ) -> Option<DismissalRecord> {
        if !self.processed.insert(suggestion.id.clone()) {
            return None;
        }
        self.dismissed_ids.insert(suggestion.id.clone());

        let fingerprint = match &suggestion.fingerprint {
            Fingerprint::Content(_) => suggestion.fingerprint.clone(),
            Fingerprint::Unanchored => compute_fingerprint(
                suggestion.range,
                suggestion.original_text.as_deref(),
                full_text,
                self.window,
            ),
        };
        if let Some(digest) = fingerprint.digest() {
            self.fingerprints.insert(digest.to_string());
        }
        debug!(
            suggestion_id = %suggestion.id,
            anchored = fingerprint.is_anchored(),
            "dismissal_recorded"
        );

        Some(DismissalRecord {
            suggestion_id: suggestion.id.clone(),
            document_id: suggestion.document_id.clone(),
            fingerprint,
            dismissed_at: Utc::now(),
        })
    }

    pub fn is_dismissed(&self, id: &SuggestionId, fingerprint: &Fingerprint) -> bool {
        if self.dismissed_ids.contains(id) {
            return true;
        }
        fingerprint
            .digest()
            .is_some_and(|digest| self.fingerprints.contains(digest))
    }

    /// Known fingerprint digests, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut digests: Vec<String> = self.fingerprints.iter().cloned().collect();
        digests.sort();
        digests
    }

    /// Load previously persisted dismissals.
    pub fn restore<'a>(&mut self, records: impl IntoIterator<Item = &'a DismissalRecord>) {
        for record in records {
            self.processed.insert(record.suggestion_id.clone());
            self.dismissed_ids.insert(record.suggestion_id.clone());
            if let Some(digest) = record.fingerprint.digest() {
                self.fingerprints.insert(digest.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.dismissed_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dismissed_ids.is_empty()
    }
}
