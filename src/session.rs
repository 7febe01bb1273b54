//! The per-document session.
//!
//! A [`Session`] owns the document projection, the suggestion store, the
//! dismissal tracker, and the orchestrator for one open document. All of it
//! sits behind a single `std::sync::Mutex` that is never held across an
//! `.await`; provider calls run as spawned tasks and report back through an
//! unbounded channel that the driver (see `driver.rs`) drains.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anchor::{
    AnchorError, Channel, Document, Edit, MutationEvent, Suggestion, SuggestionId,
};
use checker::{CheckRequest, CheckerProvider};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::apply::ApplyLock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::merge::MergeOptions;
use crate::metrics::{CheckMetrics, DiscardReason};
use crate::orchestrator::{call_with_timeout, CheckOutcome, Orchestrator, TriggerReason};
use crate::persistence::{flush, InMemoryRepository, Outbox, RepoOp, SuggestionRepository};
use crate::store::{ReconcileReport, SuggestionStore};
use crate::surface::{Decoration, EditorSurface, NullSurface};
use crate::tracker::DismissalTracker;

pub(crate) struct SessionState {
    pub(crate) document: Document,
    pub(crate) store: SuggestionStore,
    pub(crate) tracker: DismissalTracker,
    pub(crate) orchestrator: Orchestrator,
    pub(crate) outbox: Outbox,
    pub(crate) closed: bool,
    /// Set when an accept left the editor ahead of the document.
    pub(crate) resync_required: bool,
}

impl SessionState {
    pub(crate) fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::SessionClosed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn decorations(&self) -> Vec<Decoration> {
        let layout = self.document.layout();
        self.store
            .live()
            .into_iter()
            .map(|suggestion| {
                let range = layout.map_range(suggestion.range);
                Decoration {
                    start: range.from,
                    end: range.to,
                    suggestion_id: suggestion.id.clone(),
                    category: suggestion.category,
                }
            })
            .collect()
    }

    /// Run a reconcile pass and queue deletes for purged rows.
    pub(crate) fn reconcile(&mut self, now: Instant) -> ReconcileReport {
        let report = self.store.reconcile_against_text(self.document.text(), now);
        if !report.purged.is_empty() {
            let ids = report.purged.iter().map(|s| s.id.clone()).collect();
            self.outbox.push(RepoOp::Delete(ids));
        }
        report
    }

    fn live_for(&self, channel: Channel) -> Vec<Suggestion> {
        self.store
            .live()
            .into_iter()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect()
    }
}

/// Side effects collected under the state lock and performed after it.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub(crate) ops: Vec<RepoOp>,
    pub(crate) decorations: Option<Vec<Decoration>>,
}

impl Effects {
    pub(crate) fn collect(state: &mut SessionState, publish: bool) -> Self {
        Self {
            ops: state.outbox.drain(),
            decorations: publish.then(|| state.decorations()),
        }
    }
}

pub(crate) struct SessionInner {
    pub(crate) state: Mutex<SessionState>,
    pub(crate) apply_lock: ApplyLock,
    pub(crate) providers: BTreeMap<Channel, Arc<dyn CheckerProvider>>,
    pub(crate) surface: Arc<dyn EditorSurface>,
    pub(crate) repository: Arc<dyn SuggestionRepository>,
    pub(crate) metrics: Option<Arc<dyn CheckMetrics>>,
    pub(crate) config: EngineConfig,
    pub(crate) outcome_tx: UnboundedSender<CheckOutcome>,
    pub(crate) outcome_rx: tokio::sync::Mutex<UnboundedReceiver<CheckOutcome>>,
    pub(crate) wake: Notify,
}

/// Handle to an open document. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

pub struct SessionBuilder {
    document_id: String,
    version: u32,
    config: EngineConfig,
    providers: BTreeMap<Channel, Arc<dyn CheckerProvider>>,
    surface: Option<Arc<dyn EditorSurface>>,
    repository: Option<Arc<dyn SuggestionRepository>>,
    metrics: Option<Arc<dyn CheckMetrics>>,
}

impl SessionBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the provider for a channel. Channels without a provider
    /// never run.
    pub fn provider(mut self, channel: Channel, provider: Arc<dyn CheckerProvider>) -> Self {
        self.providers.insert(channel, provider);
        self
    }

    pub fn surface(mut self, surface: Arc<dyn EditorSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn SuggestionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn CheckMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Open the session on `text`, loading persisted suggestions and
    /// dismissals for this document version.
    pub async fn open(self, text: impl Into<String>) -> Result<Session, EngineError> {
        let text = text.into();
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryRepository::new()));
        let surface = self.surface.unwrap_or_else(|| Arc::new(NullSurface));

        let dismissals = repository.list_dismissals(&self.document_id).await?;
        let rows = repository.list_active(&self.document_id, self.version).await?;

        let mut tracker = DismissalTracker::new(self.config.fingerprint.window);
        tracker.restore(&dismissals);

        let mut store = SuggestionStore::new(self.config.grace_period());
        let mut stale = Vec::new();
        for row in rows {
            let id = row.id.clone();
            if let Err(err) = store.upsert(row, &text) {
                debug!(suggestion_id = %id, error = %err, "stored_suggestion_skipped");
                stale.push(id);
            }
        }

        let channels = Channel::ALL
            .into_iter()
            .filter(|channel| self.providers.contains_key(channel))
            .map(|channel| (channel, self.config.channel(channel)));
        let orchestrator = Orchestrator::new(channels);

        let mut outbox = Outbox::default();
        if !stale.is_empty() {
            outbox.push(RepoOp::Delete(stale));
        }

        info!(
            document_id = %self.document_id,
            version = self.version,
            channels = ?orchestrator.channels().collect::<Vec<_>>(),
            restored = store.len(),
            dismissed = tracker.len(),
            "session_opened"
        );

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let state = SessionState {
            document: Document::new(self.document_id, self.version, text),
            store,
            tracker,
            orchestrator,
            outbox,
            closed: false,
            resync_required: false,
        };
        let session = Session {
            inner: Arc::new(SessionInner {
                state: Mutex::new(state),
                apply_lock: ApplyLock::default(),
                providers: self.providers,
                surface,
                repository,
                metrics: self.metrics,
                config: self.config,
                outcome_tx,
                outcome_rx: tokio::sync::Mutex::new(outcome_rx),
                wake: Notify::new(),
            }),
        };
        let effects = Effects::collect(&mut session.lock_state(), false);
        session.commit(effects).await;
        Ok(session)
    }
}

/// How a finished check ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Disposition {
    Merged,
    Discarded(DiscardReason),
    Failed(checker::ProviderError),
}

impl Session {
    pub fn builder(document_id: impl Into<String>, version: u32) -> SessionBuilder {
        SessionBuilder {
            document_id: document_id.into(),
            version,
            config: EngineConfig::default(),
            providers: BTreeMap::new(),
            surface: None,
            repository: None,
            metrics: None,
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            window: self.inner.config.fingerprint.window,
            duplicate_tolerance: self.inner.config.reconcile.duplicate_tolerance,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Flush queued writes and push decorations, outside the state lock.
    pub(crate) async fn commit(&self, effects: Effects) {
        if !effects.ops.is_empty() {
            flush(self.inner.repository.as_ref(), effects.ops).await;
        }
        if let Some(decorations) = effects.decorations {
            if let Err(err) = self.inner.surface.decorate(&decorations).await {
                warn!(error = %err, "decorate_failed");
            }
        }
    }

    /// `full_sync` marks a whole-text sync, the only mutation accepted (and
    /// the one that clears the flag) after a diverged accept.
    fn mutate<F>(
        &self,
        full_sync: bool,
        apply: F,
    ) -> Result<(Option<MutationEvent>, Effects), EngineError>
    where
        F: FnOnce(&mut Document) -> Result<Option<MutationEvent>, AnchorError>,
    {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.ensure_open()?;
        if state.resync_required && !full_sync {
            return Err(EngineError::ResyncRequired);
        }
        let applied = apply(&mut state.document)?;
        if full_sync && state.resync_required {
            state.resync_required = false;
            info!(revision = state.document.revision(), "session_resynced");
        }
        let Some(event) = applied else {
            return Ok((None, Effects::default()));
        };

        state.store.shift_through(&event);
        state.orchestrator.on_mutation(&event, now);
        // Range mapping continues during an accept; validation waits for it.
        if !self.inner.apply_lock.is_held() {
            state.reconcile(now);
        }
        let effects = Effects::collect(&mut state, true);
        drop(state);

        self.inner.wake.notify_one();
        Ok((Some(event), effects))
    }

    /// Apply an incremental edit from the editor.
    pub async fn on_edit(&self, edit: Edit) -> Result<MutationEvent, EngineError> {
        let (event, effects) = self.mutate(false, |document| document.apply(&edit).map(Some))?;
        self.commit(effects).await;
        event.ok_or_else(|| EngineError::Anchor(AnchorError::InvalidEdit {
            start: edit.start,
            end: edit.end,
        }))
    }

    /// Replace the whole projection; the change is diffed into one edit.
    pub async fn sync_text(&self, text: &str) -> Result<Option<MutationEvent>, EngineError> {
        let (event, effects) = self.mutate(true, |document| Ok(document.sync(text)))?;
        self.commit(effects).await;
        Ok(event)
    }

    pub fn set_cursor(&self, offset: usize) -> Result<(), EngineError> {
        let mut state = self.lock_state();
        state.ensure_open()?;
        state.document.set_cursor(offset)?;
        Ok(())
    }

    /// Editor gained focus: every channel gets an immediate (throttled) run.
    pub fn on_focus(&self) -> Result<(), EngineError> {
        {
            let mut state = self.lock_state();
            state.ensure_open()?;
            state.orchestrator.on_focus(Instant::now());
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    pub fn on_blur(&self) {
        self.cancel_all();
    }

    pub fn cancel_all(&self) {
        self.lock_state().orchestrator.cancel_all();
        self.inner.wake.notify_one();
    }

    /// Validate every stored suggestion against the current text. Skipped
    /// (returns `None`) while an accept holds the apply lock and once the
    /// session is closed.
    pub async fn reconcile(&self) -> Option<ReconcileReport> {
        if self.inner.apply_lock.is_held() {
            debug!("reconcile_skipped_apply_in_progress");
            return None;
        }
        let (report, effects) = {
            let mut state = self.lock_state();
            if state.ensure_open().is_err() {
                return None;
            }
            let report = state.reconcile(Instant::now());
            let publish = !report.is_empty();
            (report, Effects::collect(&mut state, publish))
        };
        self.commit(effects).await;
        Some(report)
    }

    /// Live suggestions for a document version; empty when the session holds
    /// a different document or version.
    pub fn get_active_suggestions(&self, document_id: &str, version: u32) -> Vec<Suggestion> {
        let state = self.lock_state();
        if state.document.id() != document_id || state.document.version() != version {
            debug!(
                requested = document_id,
                version,
                "active_suggestions_document_mismatch"
            );
            return Vec::new();
        }
        state.store.live().into_iter().cloned().collect()
    }

    /// Live suggestions ordered by start offset.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.lock_state().store.live().into_iter().cloned().collect()
    }

    pub fn suggestion(&self, id: &SuggestionId) -> Option<Suggestion> {
        self.lock_state().store.get(id).cloned()
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        self.lock_state().decorations()
    }

    pub fn text(&self) -> String {
        self.lock_state().document.text().to_string()
    }

    pub fn revision(&self) -> u64 {
        self.lock_state().document.revision()
    }

    pub fn cursor(&self) -> usize {
        self.lock_state().document.cursor()
    }

    /// True after an accept the document could not follow; cleared by
    /// [`Session::sync_text`] or [`Session::run_check`].
    pub fn needs_resync(&self) -> bool {
        self.lock_state().resync_required
    }

    pub fn is_idle(&self) -> bool {
        self.lock_state().orchestrator.is_idle()
    }

    /// Add a suggestion produced outside the provider pipeline. Rejected
    /// unless it is well formed and anchored in the current text.
    pub async fn add_suggestion(&self, suggestion: Suggestion) -> Result<SuggestionId, EngineError> {
        let id = suggestion.id.clone();
        let effects = {
            let mut state = self.lock_state();
            state.ensure_open()?;
            let text = state.document.text().to_string();
            state
                .store
                .upsert(suggestion.clone(), &text)
                .map_err(|err| EngineError::InvalidSuggestion {
                    id: id.clone(),
                    reason: err.to_string(),
                })?;
            state.outbox.push(RepoOp::Create(suggestion));
            Effects::collect(&mut state, true)
        };
        self.commit(effects).await;
        Ok(id)
    }

    /// Check `text` on one channel right now and return the channel's live
    /// suggestions afterwards.
    ///
    /// The text is synced into the session first when it differs. Explicit
    /// checks share the channel cool-down with other immediate triggers; a
    /// throttled check returns the current suggestions unchanged.
    pub async fn run_check(
        &self,
        channel: Channel,
        text: &str,
        document_id: &str,
    ) -> Result<Vec<Suggestion>, EngineError> {
        self.run_check_inner(channel, text, document_id)
            .instrument(info_span!("run_check", channel = %channel))
            .await
    }

    async fn run_check_inner(
        &self,
        channel: Channel,
        text: &str,
        document_id: &str,
    ) -> Result<Vec<Suggestion>, EngineError> {
        {
            let state = self.lock_state();
            state.ensure_open()?;
            if state.document.id() != document_id {
                return Err(EngineError::DocumentMismatch {
                    expected: state.document.id().to_string(),
                    found: document_id.to_string(),
                });
            }
        }
        let provider = self
            .inner
            .providers
            .get(&channel)
            .cloned()
            .ok_or(EngineError::UnknownChannel(channel))?;
        if self.inner.apply_lock.is_held() {
            return Err(EngineError::ApplyInProgress);
        }

        let (_, effects) = self.mutate(true, |document| Ok(document.sync(text)))?;
        self.commit(effects).await;

        let (request, timeout) = {
            let mut state = self.lock_state();
            let now = Instant::now();
            if !state.orchestrator.request(channel, TriggerReason::Explicit, now)? {
                return Ok(state.live_for(channel));
            }
            let Some(due) = state.orchestrator.begin(channel, now)? else {
                return Ok(state.live_for(channel));
            };
            let timeout = state
                .orchestrator
                .settings(channel)
                .map(|settings| settings.timeout)
                .unwrap_or_else(|| self.inner.config.channel(channel).timeout);
            let request = CheckRequest::new(channel, due.revision, state.document.text())
                .with_language(self.inner.config.language.clone());
            (request, timeout)
        };

        let started = Instant::now();
        let result = call_with_timeout(provider.as_ref(), &request, timeout).await;
        let outcome = CheckOutcome {
            channel,
            revision: request.revision,
            snapshot: request.text,
            result,
            latency: started.elapsed(),
        };

        match self.handle_outcome(outcome).await {
            Disposition::Failed(err) => Err(EngineError::Provider(err)),
            Disposition::Discarded(DiscardReason::ApplyInProgress) => {
                Err(EngineError::ApplyInProgress)
            }
            Disposition::Merged | Disposition::Discarded(_) => {
                Ok(self.lock_state().live_for(channel))
            }
        }
    }

    /// Cancel everything and stop the driver.
    pub fn close(&self) {
        {
            let mut state = self.lock_state();
            state.closed = true;
            state.orchestrator.cancel_all();
        }
        self.inner.wake.notify_one();
        info!("session_closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock_state().closed
    }
}
