//! Folding one provider response into the store.

use std::collections::HashSet;

use anchor::{
    compute_fingerprint, is_same_edit, Channel, Document, EditShape, Suggestion, SuggestionId,
    DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_WINDOW,
};
use checker::{normalize_response, NormalizedMatch, ProviderResponse};
use tracing::debug;

use crate::store::SuggestionStore;
use crate::tracker::DismissalTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub window: usize,
    pub duplicate_tolerance: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            duplicate_tolerance: DEFAULT_DUPLICATE_TOLERANCE,
        }
    }
}

/// What a merge did to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub created: Vec<Suggestion>,
    /// Existing entries of the channel whose explanation changed.
    pub refreshed: Vec<Suggestion>,
    /// Entries of the channel this run no longer reports.
    pub removed: Vec<Suggestion>,
    pub skipped_invalid: usize,
    pub skipped_dismissed: usize,
    pub skipped_duplicate: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Applied(MergeReport),
    /// The document moved on while the provider was working.
    SnapshotMismatch,
}

enum Verdict {
    New,
    Confirms(SuggestionId),
    /// Same edit already offered by another channel.
    CrossChannel,
}

fn classify(
    store: &SuggestionStore,
    channel: Channel,
    candidate: &NormalizedMatch,
    tolerance: usize,
) -> Verdict {
    let shape = EditShape {
        range: candidate.range,
        original_text: Some(candidate.original_text.as_str()),
        suggested_text: candidate.suggested_text.as_deref(),
    };
    let start = candidate.range.start.saturating_sub(tolerance);
    let end = candidate.range.end.saturating_add(tolerance);

    let mut verdict = Verdict::New;
    for existing in store.query_range(start, end) {
        if !is_same_edit(&EditShape::from(existing), &shape, tolerance) {
            continue;
        }
        if existing.channel == channel {
            return Verdict::Confirms(existing.id.clone());
        }
        verdict = Verdict::CrossChannel;
    }
    verdict
}

/// Merge `response` for `channel` into `store`.
///
/// Items are validated one by one against `snapshot`; malformed ones are
/// skipped. Dismissed content and duplicates of live suggestions are dropped,
/// duplicates within the same channel refresh the existing entry, and every
/// entry of the channel this run did not confirm is removed.
pub fn merge_response(
    store: &mut SuggestionStore,
    tracker: &DismissalTracker,
    document: &Document,
    channel: Channel,
    snapshot: &str,
    response: &ProviderResponse,
    options: MergeOptions,
) -> MergeOutcome {
    if snapshot != document.text() {
        return MergeOutcome::SnapshotMismatch;
    }
    let text = document.text();
    let normalized = normalize_response(response, text, channel);

    let mut report = MergeReport {
        skipped_invalid: normalized.skipped.len(),
        ..MergeReport::default()
    };
    let mut confirmed: HashSet<SuggestionId> = HashSet::new();

    for candidate in normalized.matches {
        let fingerprint = compute_fingerprint(
            candidate.range,
            Some(&candidate.original_text),
            text,
            options.window,
        );
        let id = SuggestionId::new();
        if tracker.is_dismissed(&id, &fingerprint) {
            report.skipped_dismissed += 1;
            continue;
        }

        match classify(store, channel, &candidate, options.duplicate_tolerance) {
            Verdict::Confirms(existing) => {
                if store.refresh_explanation(&existing, &candidate.explanation) {
                    if let Some(updated) = store.get(&existing) {
                        report.refreshed.push(updated.clone());
                    }
                }
                confirmed.insert(existing);
                report.skipped_duplicate += 1;
                continue;
            }
            Verdict::CrossChannel => {
                report.skipped_duplicate += 1;
                continue;
            }
            Verdict::New => {}
        }

        let mut suggestion = Suggestion::new(
            document.id(),
            document.version(),
            channel,
            candidate.category,
            candidate.range,
        )
        .with_id(id.clone())
        .with_original(candidate.original_text)
        .with_explanation(candidate.explanation)
        .with_confidence(candidate.confidence)
        .with_fingerprint(fingerprint);
        suggestion.suggested_text = candidate.suggested_text;

        match store.upsert(suggestion.clone(), text) {
            Ok(_) => {
                confirmed.insert(id);
                report.created.push(suggestion);
            }
            Err(err) => {
                debug!(channel = %channel, error = %err, "candidate_rejected");
                report.skipped_invalid += 1;
            }
        }
    }

    let superseded: Vec<SuggestionId> = store
        .by_channel(channel)
        .into_iter()
        .filter(|existing| !confirmed.contains(&existing.id))
        .map(|existing| existing.id.clone())
        .collect();
    report.removed = store.remove(&superseded);

    MergeOutcome::Applied(report)
}
