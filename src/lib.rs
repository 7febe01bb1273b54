//! Proofline: keeps live writing suggestions in sync with a document that is
//! being edited.
//!
//! Several analyzer channels (spelling, grammar, style) check the text in the
//! background. Their findings are anchored to char ranges, kept valid as the
//! user types, deduplicated, remembered when dismissed, and applied safely
//! when accepted.
//!
//! ```text
//! editor edits ──► Session::on_edit ──► Document ──► MutationEvent
//!                                         │
//!                 ┌───────────────────────┼─────────────────────┐
//!                 ▼                       ▼                     ▼
//!          SuggestionStore          Orchestrator           BlockLayout
//!     (shift + reconcile)     (Idle → Scheduled → Running)  (decorations)
//!                 ▲                       │
//!                 │                spawn_job (provider)
//!                 │                       │
//!                 └── merge_response ◄── CheckOutcome (newest revision only)
//! ```
//!
//! The session is driven either by awaiting [`Session::drive_once`] /
//! [`Session::run_until_idle`] yourself or by [`Session::spawn_driver`].

mod apply;
pub mod config;
mod driver;
mod error;
mod merge;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
mod session;
mod store;
pub mod surface;
mod tracker;

pub use crate::apply::{AcceptOutcome, ApplyGuard, ApplyLock};
pub use crate::config::{ChannelSettings, ConfigLoadError, EngineConfig, ProviderKind};
pub use crate::error::EngineError;
pub use crate::merge::{merge_response, MergeOptions, MergeOutcome, MergeReport};
pub use crate::metrics::{CheckMetrics, DiscardReason};
pub use crate::orchestrator::{Orchestrator, TriggerReason};
pub use crate::persistence::{
    DismissalRecord, InMemoryRepository, PersistenceError, RepoOp, SuggestionRepository,
};
pub use crate::session::{Session, SessionBuilder};
pub use crate::store::{EntryStatus, ReconcileReport, SuggestionStore};
pub use crate::surface::{Decoration, EditorSurface, NullSurface, RecordingSurface, SurfaceError};
pub use crate::tracker::DismissalTracker;

pub use anchor::{
    Category, Channel, Document, Edit, Fingerprint, MutationEvent, StructuralRange, Suggestion,
    SuggestionId, TextRange,
};
pub use checker::{CheckRequest, CheckerProvider, DictionaryProvider, ProviderError, ProviderResponse};

#[cfg(feature = "http")]
pub use checker::{HttpProvider, HttpProviderConfig, HttpProviderKind};

use std::sync::Arc;

/// Providers for every channel per `config`: the built-in dictionaries, or
/// one HTTP provider shared by all channels.
pub fn providers_from_config(
    config: &EngineConfig,
) -> Result<Vec<(Channel, Arc<dyn CheckerProvider>)>, ProviderError> {
    match config.provider.kind {
        ProviderKind::Dictionary => {
            let spelling: Arc<dyn CheckerProvider> = Arc::new(DictionaryProvider::spelling());
            let grammar: Arc<dyn CheckerProvider> = Arc::new(DictionaryProvider::grammar());
            let style: Arc<dyn CheckerProvider> = Arc::new(DictionaryProvider::style());
            Ok(vec![
                (Channel::Spelling, spelling),
                (Channel::Grammar, grammar),
                (Channel::Style, style),
            ])
        }
        #[cfg(feature = "http")]
        ProviderKind::Http => {
            let provider: Arc<dyn CheckerProvider> =
                Arc::new(HttpProvider::new(config.provider.http.clone())?);
            Ok(Channel::ALL
                .into_iter()
                .map(|channel| (channel, Arc::clone(&provider)))
                .collect())
        }
        #[cfg(not(feature = "http"))]
        ProviderKind::Http => Err(ProviderError::InvalidConfig(
            "http provider disabled at compile time".into(),
        )),
    }
}

impl SessionBuilder {
    /// Register every provider from [`providers_from_config`].
    pub fn providers(
        mut self,
        providers: impl IntoIterator<Item = (Channel, Arc<dyn CheckerProvider>)>,
    ) -> Self {
        for (channel, provider) in providers {
            self = self.provider(channel, provider);
        }
        self
    }
}
