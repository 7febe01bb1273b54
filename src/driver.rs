//! The session driver: starts due checks, applies returning outcomes, and
//! purges expired suggestions.

use std::future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::merge::{merge_response, MergeOutcome, MergeReport};
use crate::metrics::DiscardReason;
use crate::orchestrator::{spawn_job, CheckOutcome, RunStatus};
use crate::persistence::{Outbox, RepoOp};
use crate::session::{Disposition, Effects, Session};

use checker::CheckRequest;

enum Wakeup {
    Outcome(CheckOutcome),
    Timer,
    Notified,
}

fn queue_merge_writes(outbox: &mut Outbox, document_id: &str, report: &MergeReport) {
    if !report.created.is_empty() || !report.removed.is_empty() {
        outbox.push(RepoOp::ReplaceSuperseded {
            document_id: document_id.to_string(),
            superseded: report.removed.iter().map(|s| s.id.clone()).collect(),
            fresh: report.created.clone(),
        });
    }
    for refreshed in &report.refreshed {
        outbox.push(RepoOp::Update(refreshed.clone()));
    }
}

impl Session {
    /// Spawn provider calls for every channel whose deadline has passed.
    fn start_due_jobs(&self) -> Result<(), EngineError> {
        let now = Instant::now();
        let mut state = self.lock_state();
        state.ensure_open()?;
        for due in state.orchestrator.take_due(now) {
            let Some(provider) = self.inner.providers.get(&due.channel) else {
                state.orchestrator.finish(due.channel, due.revision);
                continue;
            };
            let timeout = state
                .orchestrator
                .settings(due.channel)
                .map(|settings| settings.timeout)
                .unwrap_or_else(|| self.inner.config.channel(due.channel).timeout);
            let request = CheckRequest::new(due.channel, due.revision, state.document.text())
                .with_language(self.inner.config.language.clone());
            debug!(
                channel = %due.channel,
                revision = due.revision,
                reason = due.reason.as_str(),
                provider = provider.id(),
                "check_started"
            );
            let handle = spawn_job(
                Arc::clone(provider),
                request,
                timeout,
                self.inner.outcome_tx.clone(),
            );
            state.orchestrator.attach(due.channel, due.revision, handle);
        }
        Ok(())
    }

    /// Wait for the next thing to happen and handle it: a provider outcome,
    /// a channel deadline or purge deadline, or a wake-up after a mutation.
    pub async fn drive_once(&self) -> Result<(), EngineError> {
        self.start_due_jobs()?;

        let deadline = {
            let state = self.lock_state();
            match (state.orchestrator.next_deadline(), state.store.next_purge_at()) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            }
        };
        let timer = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => future::pending::<()>().await,
            }
        };

        let wakeup = {
            let mut rx = self.inner.outcome_rx.lock().await;
            tokio::select! {
                biased;
                Some(outcome) = rx.recv() => Wakeup::Outcome(outcome),
                _ = timer => Wakeup::Timer,
                _ = self.inner.wake.notified() => Wakeup::Notified,
            }
        };

        match wakeup {
            Wakeup::Outcome(outcome) => {
                self.handle_outcome(outcome).await;
            }
            Wakeup::Timer => {
                self.start_due_jobs()?;
                self.reconcile().await;
            }
            Wakeup::Notified => {}
        }
        Ok(())
    }

    /// Drive until every channel is idle.
    pub async fn run_until_idle(&self) -> Result<(), EngineError> {
        while !self.is_idle() {
            self.drive_once().await?;
        }
        Ok(())
    }

    /// Run the driver on the tokio runtime until the session is closed.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                match session.drive_once().await {
                    Ok(()) => {}
                    Err(EngineError::SessionClosed) => break,
                    Err(err) => warn!(error = %err, "driver_error"),
                }
            }
            debug!("driver_stopped");
        })
    }

    /// Apply a finished check. Only the current revision of a channel is
    /// merged; anything else is discarded without touching the store.
    pub(crate) async fn handle_outcome(&self, outcome: CheckOutcome) -> Disposition {
        let metrics = self.inner.metrics.clone();
        let CheckOutcome {
            channel,
            revision,
            snapshot,
            result,
            latency,
        } = outcome;

        let discard = |reason: DiscardReason| {
            debug!(channel = %channel, revision, reason = reason.as_str(), "check_discarded");
            if let Some(metrics) = &metrics {
                metrics.record_discarded(channel, reason);
            }
            Disposition::Discarded(reason)
        };

        let effects = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            if state.orchestrator.finish(channel, revision) == RunStatus::Stale {
                return discard(DiscardReason::StaleRevision);
            }
            if self.inner.apply_lock.is_held() {
                return discard(DiscardReason::ApplyInProgress);
            }

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    warn!(channel = %channel, revision, error = %err, "check_failure");
                    if let Some(metrics) = &metrics {
                        metrics.record_check(channel, latency, Err(err.clone()));
                    }
                    return Disposition::Failed(err);
                }
            };

            let report = match merge_response(
                &mut state.store,
                &state.tracker,
                &state.document,
                channel,
                &snapshot,
                &response,
                self.merge_options(),
            ) {
                MergeOutcome::Applied(report) => report,
                MergeOutcome::SnapshotMismatch => {
                    return discard(DiscardReason::SnapshotMismatch);
                }
            };

            let live = state
                .store
                .live()
                .iter()
                .filter(|s| s.channel == channel)
                .count();
            info!(
                channel = %channel,
                revision,
                latency_ms = latency.as_millis() as u64,
                created = report.created.len(),
                removed = report.removed.len(),
                skipped_invalid = report.skipped_invalid,
                skipped_dismissed = report.skipped_dismissed,
                skipped_duplicate = report.skipped_duplicate,
                live,
                "check_completed"
            );
            if let Some(metrics) = &metrics {
                if report.skipped_invalid > 0 {
                    metrics.record_skipped_items(channel, report.skipped_invalid);
                }
                metrics.record_check(channel, latency, Ok(live));
            }

            queue_merge_writes(&mut state.outbox, state.document.id(), &report);
            Effects::collect(state, true)
        };

        self.commit(effects).await;
        Disposition::Merged
    }
}
