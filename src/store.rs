//! The suggestion store: single source of truth for every suggestion the
//! session knows about.
//!
//! Entries are indexed by id and by start offset. An entry is either live or
//! invalid; invalid entries are kept for a grace period (the text may come
//! back, e.g. on undo) and then purged for good.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use anchor::{
    check_anchor, map_range, Channel, Mapping, MutationEvent, Suggestion, SuggestionId,
    TextRange, ValidationError,
};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Live,
    /// Failed validation at `since`; purged once the grace period runs out.
    Invalid { since: Instant },
}

#[derive(Debug, Clone)]
struct Entry {
    suggestion: Suggestion,
    status: EntryStatus,
}

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub invalidated: Vec<SuggestionId>,
    pub revived: Vec<SuggestionId>,
    pub purged: Vec<Suggestion>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.invalidated.is_empty() && self.revived.is_empty() && self.purged.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SuggestionStore {
    entries: HashMap<SuggestionId, Entry>,
    by_start: BTreeMap<usize, BTreeSet<SuggestionId>>,
    grace_period: Duration,
}

impl Default for SuggestionStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

impl SuggestionStore {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            by_start: BTreeMap::new(),
            grace_period,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index(&mut self, id: &SuggestionId, start: usize) {
        self.by_start.entry(start).or_default().insert(id.clone());
    }

    fn unindex(&mut self, id: &SuggestionId, start: usize) {
        if let Some(ids) = self.by_start.get_mut(&start) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_start.remove(&start);
            }
        }
    }

    /// Insert or replace by id. The suggestion must be well formed and
    /// anchored in `text`; otherwise it is rejected and never stored.
    pub fn upsert(
        &mut self,
        suggestion: Suggestion,
        text: &str,
    ) -> Result<Option<Suggestion>, ValidationError> {
        suggestion.validate_shape()?;
        check_anchor(&suggestion, text)?;

        let id = suggestion.id.clone();
        let start = suggestion.range.start;
        let previous = self.take(&id);
        self.index(&id, start);
        self.entries.insert(
            id,
            Entry {
                suggestion,
                status: EntryStatus::Live,
            },
        );
        Ok(previous)
    }

    pub fn get(&self, id: &SuggestionId) -> Option<&Suggestion> {
        self.entries.get(id).map(|entry| &entry.suggestion)
    }

    pub fn status(&self, id: &SuggestionId) -> Option<EntryStatus> {
        self.entries.get(id).map(|entry| entry.status)
    }

    pub fn is_live(&self, id: &SuggestionId) -> bool {
        matches!(self.status(id), Some(EntryStatus::Live))
    }

    /// Replace the explanation of an existing entry. Returns `false` when the
    /// id is unknown or the text is unchanged.
    pub fn refresh_explanation(&mut self, id: &SuggestionId, explanation: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) if entry.suggestion.explanation != explanation => {
                entry.suggestion.explanation = explanation.to_string();
                true
            }
            _ => false,
        }
    }

    /// Iterate entries in start order.
    fn ordered(&self) -> impl Iterator<Item = &Entry> {
        self.by_start
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.entries.get(id))
    }

    /// Live suggestions ordered by start offset.
    pub fn live(&self) -> Vec<&Suggestion> {
        self.ordered()
            .filter(|entry| entry.status == EntryStatus::Live)
            .map(|entry| &entry.suggestion)
            .collect()
    }

    /// Every entry of a channel, live or not.
    pub fn by_channel(&self, channel: Channel) -> Vec<&Suggestion> {
        self.ordered()
            .filter(|entry| entry.suggestion.channel == channel)
            .map(|entry| &entry.suggestion)
            .collect()
    }

    /// Live suggestions overlapping `[start, end)`.
    pub fn query_range(&self, start: usize, end: usize) -> Vec<&Suggestion> {
        if start >= end {
            return Vec::new();
        }
        self.by_start
            .range(..end)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| entry.status == EntryStatus::Live && entry.suggestion.range.end > start)
            .map(|entry| &entry.suggestion)
            .collect()
    }

    pub fn take(&mut self, id: &SuggestionId) -> Option<Suggestion> {
        let entry = self.entries.remove(id)?;
        self.unindex(id, entry.suggestion.range.start);
        Some(entry.suggestion)
    }

    /// Physically remove `ids`; unknown ids are ignored.
    pub fn remove(&mut self, ids: &[SuggestionId]) -> Vec<Suggestion> {
        ids.iter().filter_map(|id| self.take(id)).collect()
    }

    /// Map stored ranges through an edit. Ranges the edit touched stay where
    /// they are so the next reconcile pass can judge them.
    pub fn shift_through(&mut self, event: &MutationEvent) {
        let moved: Vec<(SuggestionId, TextRange, TextRange)> = self
            .entries
            .iter()
            .filter_map(|(id, entry)| match map_range(entry.suggestion.range, event) {
                Mapping::Shifted(range) => Some((id.clone(), entry.suggestion.range, range)),
                Mapping::Untouched | Mapping::Overlapped => None,
            })
            .collect();

        for (id, old, new) in moved {
            self.unindex(&id, old.start);
            self.index(&id, new.start);
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.suggestion.range = new;
            }
        }
    }

    /// Validate every entry against `text`: newly broken entries become
    /// invalid, repaired ones come back, and entries invalid for longer than
    /// the grace period are removed.
    pub fn reconcile_against_text(&mut self, text: &str, now: Instant) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut expired = Vec::new();

        for (id, entry) in self.entries.iter_mut() {
            let valid = check_anchor(&entry.suggestion, text).is_ok();
            match (entry.status, valid) {
                (EntryStatus::Live, true) => {}
                (EntryStatus::Live, false) => {
                    entry.status = EntryStatus::Invalid { since: now };
                    report.invalidated.push(id.clone());
                }
                (EntryStatus::Invalid { .. }, true) => {
                    entry.status = EntryStatus::Live;
                    report.revived.push(id.clone());
                }
                (EntryStatus::Invalid { since }, false) => {
                    if now.saturating_duration_since(since) > self.grace_period {
                        expired.push(id.clone());
                    }
                }
            }
        }

        report.purged = self.remove(&expired);
        report.invalidated.sort();
        report.revived.sort();
        if !report.is_empty() {
            debug!(
                invalidated = report.invalidated.len(),
                revived = report.revived.len(),
                purged = report.purged.len(),
                "store_reconciled"
            );
        }
        report
    }

    /// When the oldest invalid entry becomes eligible for purging (the first
    /// tick strictly past its grace period).
    pub fn next_purge_at(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter_map(|entry| match entry.status {
                EntryStatus::Invalid { since } => {
                    Some(since + self.grace_period + Duration::from_millis(1))
                }
                EntryStatus::Live => None,
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor::{Category, Document, Edit};

    const TEXT: &str = "Test with misspeled words and bad grammer.";

    fn suggestion(id: &str, start: usize, end: usize, original: &str) -> Suggestion {
        Suggestion::new(
            "doc",
            1,
            Channel::Spelling,
            Category::Spelling,
            TextRange { start, end },
        )
        .with_id(id)
        .with_original(original)
    }

    fn store_with_two() -> SuggestionStore {
        let mut store = SuggestionStore::default();
        store
            .upsert(suggestion("a", 10, 19, "misspeled").with_suggestion("misspelled"), TEXT)
            .unwrap();
        store
            .upsert(suggestion("b", 34, 41, "grammer").with_suggestion("grammar"), TEXT)
            .unwrap();
        store
    }

    #[test]
    fn upsert_rejects_empty_and_out_of_bounds() {
        let mut store = SuggestionStore::default();
        let empty = suggestion("e", 5, 5, "x");
        assert!(matches!(
            store.upsert(empty, TEXT),
            Err(ValidationError::EmptyRange(5))
        ));
        let oob = Suggestion::new("doc", 1, Channel::Spelling, Category::Spelling, TextRange {
            start: 40,
            end: 90,
        });
        assert!(matches!(
            store.upsert(oob, TEXT),
            Err(ValidationError::OutOfBounds { .. })
        ));
        let mismatch = suggestion("m", 10, 19, "something");
        assert!(store.upsert(mismatch, TEXT).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn upsert_replaces_same_id() {
        let mut store = store_with_two();
        let replaced = store
            .upsert(suggestion("a", 10, 19, "misspeled").with_explanation("new"), TEXT)
            .unwrap();
        assert!(replaced.is_some());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&"a".into()).unwrap().explanation, "new");
    }

    #[test]
    fn query_range_is_half_open() {
        let store = store_with_two();
        assert_eq!(store.query_range(0, 10).len(), 0);
        assert_eq!(store.query_range(18, 19).len(), 1);
        assert_eq!(store.query_range(19, 34).len(), 0);
        assert_eq!(store.query_range(0, 100).len(), 2);
    }

    #[test]
    fn remove_ignores_unknown_ids() {
        let mut store = store_with_two();
        let removed = store.remove(&["a".into(), "zzz".into()]);
        assert_eq!(removed.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn shift_then_reconcile_keeps_later_suggestion_live() {
        let mut store = store_with_two();
        let mut doc = Document::new("doc", 1, TEXT);
        let event = doc
            .apply(&Edit::replace(TextRange { start: 10, end: 19 }, "misspelled"))
            .unwrap();
        store.take(&"a".into());
        store.shift_through(&event);
        let report = store.reconcile_against_text(doc.text(), Instant::now());
        assert!(report.is_empty());
        assert_eq!(store.get(&"b".into()).unwrap().range, TextRange { start: 35, end: 42 });
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut store = store_with_two();
        let now = Instant::now();
        let first = store.reconcile_against_text("Test with misspeled words.", now);
        assert_eq!(first.invalidated, vec![SuggestionId::from("b")]);
        let live_after_first: Vec<_> = store.live().into_iter().cloned().collect();
        let second = store.reconcile_against_text("Test with misspeled words.", now);
        assert!(second.is_empty());
        let live_after_second: Vec<_> = store.live().into_iter().cloned().collect();
        assert_eq!(live_after_first, live_after_second);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_entries_revive_or_purge_after_grace() {
        let mut store = store_with_two();
        let broken = "Test with misspelx words and bad grammer.";
        store.reconcile_against_text(broken, Instant::now());
        assert!(!store.is_live(&"a".into()));
        let purge_at = store.next_purge_at().unwrap();

        // Undo brings it back inside the grace period.
        tokio::time::advance(Duration::from_millis(500)).await;
        let report = store.reconcile_against_text(TEXT, Instant::now());
        assert_eq!(report.revived, vec![SuggestionId::from("a")]);
        assert!(store.next_purge_at().is_none());

        store.reconcile_against_text(broken, Instant::now());
        tokio::time::advance(Duration::from_millis(1600)).await;
        let report = store.reconcile_against_text(broken, Instant::now());
        assert_eq!(report.purged.len(), 1);
        assert!(store.get(&"a".into()).is_none());
        assert!(purge_at < Instant::now());
    }

    #[test]
    fn live_is_ordered_by_start() {
        let store = store_with_two();
        let starts: Vec<usize> = store.live().iter().map(|s| s.range.start).collect();
        assert_eq!(starts, vec![10, 34]);
    }
}
