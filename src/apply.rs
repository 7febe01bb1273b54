//! Accepting and dismissing suggestions.
//!
//! An accept runs in three phases so the state lock is never held while the
//! editor works:
//!
//! 1. Under the lock: resolve the suggestion, re-locate its original text,
//!    and map the span to structural coordinates.
//! 2. Unlocked: push the replacement to the editor surface.
//! 3. Under the lock: apply the edit to the document, retire the suggestion,
//!    map and reconcile everything else, and re-schedule the channels.
//!
//! If phase 3 cannot follow the editor (the text moved or the suggestion was
//! retired meanwhile), the accept fails with
//! [`EngineError::SurfaceDiverged`] and the session refuses incremental
//! edits and accepts until [`Session::sync_text`] hands it the editor's text.
//!
//! The apply lock is held across all three phases plus the settle delay.

use std::sync::atomic::{AtomicBool, Ordering};

use anchor::{
    locate_by_text, Edit, LocateStrategy, MutationEvent, StructuralRange, Suggestion,
    SuggestionId, TextRange,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

use crate::error::EngineError;
use crate::metrics::MetricsSpan;
use crate::persistence::RepoOp;
use crate::session::{Effects, Session, SessionState};

/// Single-holder flag guarding accepts. Contenders fail fast.
#[derive(Debug, Default)]
pub struct ApplyLock {
    held: AtomicBool,
}

impl ApplyLock {
    pub fn try_acquire(&self) -> Option<ApplyGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ApplyGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the apply lock on drop, on every exit path.
#[derive(Debug)]
pub struct ApplyGuard<'a> {
    lock: &'a ApplyLock,
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptOutcome {
    pub new_text: String,
    /// Live suggestions after the accept, ordered by start.
    pub suggestions: Vec<Suggestion>,
    /// Where the replacement landed in the editor.
    pub structural: StructuralRange,
    /// Plain-text cursor after the replacement.
    pub cursor: usize,
    pub revision: u64,
}

impl Session {
    /// Apply a suggestion's replacement to the document.
    ///
    /// `replacement` overrides the suggestion's own suggested text.
    pub async fn accept_suggestion(
        &self,
        id: &SuggestionId,
        replacement: Option<&str>,
    ) -> Result<AcceptOutcome, EngineError> {
        let span = MetricsSpan::start(self.inner.metrics.as_ref());
        let result = self
            .accept_inner(id, replacement)
            .instrument(info_span!("accept", suggestion_id = %id))
            .await;
        if let Some(span) = span {
            span.record_accept(result.as_ref().map(|_| ()).map_err(|err| err.clone()));
        }
        match &result {
            Ok(outcome) => info!(
                suggestion_id = %id,
                revision = outcome.revision,
                remaining = outcome.suggestions.len(),
                "suggestion_accepted"
            ),
            Err(err) => warn!(suggestion_id = %id, error = %err, "accept_failure"),
        }
        result
    }

    async fn accept_inner(
        &self,
        id: &SuggestionId,
        replacement: Option<&str>,
    ) -> Result<AcceptOutcome, EngineError> {
        let _guard = self
            .inner
            .apply_lock
            .try_acquire()
            .ok_or(EngineError::ApplyInProgress)?;
        let strategy = self.inner.config.locate_strategy();

        let (original, replacement, located, structural, revision) = {
            let state = self.lock_state();
            state.ensure_open()?;
            if state.resync_required {
                return Err(EngineError::ResyncRequired);
            }
            let suggestion = state
                .store
                .get(id)
                .filter(|_| state.store.is_live(id))
                .ok_or_else(|| EngineError::NotFound(id.clone()))?;
            let original = suggestion.original_text.clone().ok_or_else(|| {
                EngineError::InvalidSuggestion {
                    id: id.clone(),
                    reason: "missing original text".into(),
                }
            })?;
            let replacement = replacement
                .map(str::to_string)
                .or_else(|| suggestion.suggested_text.clone())
                .ok_or_else(|| EngineError::InvalidSuggestion {
                    id: id.clone(),
                    reason: "no replacement available".into(),
                })?;
            let located = locate_by_text(
                &original,
                state.document.text(),
                Some(suggestion.range.start),
                strategy,
            )?;
            let structural = state.document.layout().map_range(located.range);
            (
                original,
                replacement,
                located.range,
                structural,
                state.document.revision(),
            )
        };

        self.inner
            .surface
            .replace_range(structural, &replacement)
            .await?;

        let (outcome, restore_at, effects) = {
            let now = Instant::now();
            let mut state = self.lock_state();
            // The editor already holds the replacement; if the document can
            // no longer follow it, the two are out of step until a full sync.
            let spliced = splice(
                &mut state,
                id,
                &original,
                &replacement,
                located,
                revision,
                strategy,
            );
            let event = match spliced {
                Ok(event) => event,
                Err(reason) => {
                    state.resync_required = true;
                    state.orchestrator.cancel_all();
                    warn!(suggestion_id = %id, reason = %reason, "surface_diverged");
                    return Err(EngineError::SurfaceDiverged {
                        id: id.clone(),
                        reason,
                    });
                }
            };
            let cursor = event.new_end();
            state.document.set_cursor(cursor)?;

            if let Some(mut accepted) = state.store.take(id) {
                accepted.flags.accepted = true;
                state.outbox.push(RepoOp::Update(accepted));
            }
            state.store.shift_through(&event);
            state.reconcile(now);
            state.orchestrator.reschedule_all(now);

            let layout = state.document.layout();
            let outcome = AcceptOutcome {
                new_text: state.document.text().to_string(),
                suggestions: state.store.live().into_iter().cloned().collect(),
                structural,
                cursor,
                revision: event.revision,
            };
            let restore_at = layout.to_structural(cursor);
            (outcome, restore_at, Effects::collect(&mut state, true))
        };
        self.inner.wake.notify_one();

        tokio::time::sleep(self.inner.config.settle_delay()).await;
        if let Err(err) = self.inner.surface.restore_selection(restore_at).await {
            warn!(position = restore_at, error = %err, "selection_restore_failed");
        }
        self.commit(effects).await;
        Ok(outcome)
    }

    /// Retire a suggestion and remember its content so it is not offered
    /// again.
    ///
    /// Fails with [`EngineError::ApplyInProgress`] while an accept is running,
    /// since that accept may be applying this very suggestion.
    pub async fn dismiss_suggestion(&self, id: &SuggestionId) -> Result<(), EngineError> {
        let effects = {
            let mut state = self.lock_state();
            state.ensure_open()?;
            if self.inner.apply_lock.is_held() {
                return Err(EngineError::ApplyInProgress);
            }
            let mut dismissed = state
                .store
                .take(id)
                .ok_or_else(|| EngineError::NotFound(id.clone()))?;
            dismissed.flags.dismissed = true;
            let text = state.document.text().to_string();
            if let Some(record) = state.tracker.record_dismissal(&dismissed, &text) {
                state.outbox.push(RepoOp::Dismiss(record));
            }
            state.outbox.push(RepoOp::Update(dismissed));
            Effects::collect(&mut state, true)
        };
        self.commit(effects).await;
        info!(suggestion_id = %id, "suggestion_dismissed");
        Ok(())
    }
}

/// Phase 3 edit: follow the replacement the editor made. Nothing is changed
/// when this fails.
fn splice(
    state: &mut SessionState,
    id: &SuggestionId,
    original: &str,
    replacement: &str,
    located: TextRange,
    revision: u64,
    strategy: LocateStrategy,
) -> Result<MutationEvent, String> {
    if state.store.get(id).is_none() {
        return Err("suggestion was retired while the editor applied it".into());
    }
    // The user may have typed while the editor was busy.
    let range = if state.document.revision() == revision {
        located
    } else {
        locate_by_text(original, state.document.text(), Some(located.start), strategy)
            .map_err(|err| err.to_string())?
            .range
    };
    state
        .document
        .apply(&Edit::replace(range, replacement))
        .map_err(|err| err.to_string())
}
