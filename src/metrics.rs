//! Metrics hooks for a session.
//!
//! Hosts pass a [`CheckMetrics`] implementation to the session builder; the
//! session reports every check outcome, every discarded outcome, skipped
//! provider items, and accept latency. Nothing here knows about a concrete
//! metrics backend.

use std::sync::Arc;
use std::time::Duration;

use anchor::Channel;
use checker::ProviderError;
use tokio::time::Instant;

use crate::error::EngineError;

/// Why a completed check was thrown away without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscardReason {
    /// A newer run was issued for the channel.
    StaleRevision,
    /// The document changed while the call was in flight.
    SnapshotMismatch,
    /// An accept held the apply lock.
    ApplyInProgress,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::StaleRevision => "stale_revision",
            DiscardReason::SnapshotMismatch => "snapshot_mismatch",
            DiscardReason::ApplyInProgress => "apply_in_progress",
        }
    }
}

/// Metrics observer for check runs and accepts.
pub trait CheckMetrics: Send + Sync {
    /// `result` carries the number of suggestions live for the channel after
    /// the merge.
    fn record_check(&self, channel: Channel, latency: Duration, result: Result<usize, ProviderError>);
    fn record_discarded(&self, channel: Channel, reason: DiscardReason);
    fn record_skipped_items(&self, channel: Channel, count: usize);
    fn record_accept(&self, latency: Duration, result: Result<(), EngineError>);
}

pub(crate) struct MetricsSpan {
    recorder: Arc<dyn CheckMetrics>,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start(recorder: Option<&Arc<dyn CheckMetrics>>) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: Arc::clone(recorder),
            start: Instant::now(),
        })
    }

    pub(crate) fn record_accept(self, result: Result<(), EngineError>) {
        self.recorder.record_accept(self.start.elapsed(), result);
    }
}
