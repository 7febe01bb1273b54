use anchor::{AnchorError, Channel, SuggestionId};
use checker::ProviderError;
use thiserror::Error;

use crate::persistence::PersistenceError;
use crate::surface::SurfaceError;

/// Errors returned to callers of a [`Session`](crate::Session).
///
/// Background check failures never show up here; they are logged and the
/// channel tries again on its next trigger.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// No live suggestion has this id.
    #[error("suggestion {0} not found")]
    NotFound(SuggestionId),
    /// The suggestion cannot be applied as it stands.
    #[error("suggestion {id} cannot be applied: {reason}")]
    InvalidSuggestion { id: SuggestionId, reason: String },
    /// The suggestion's original text no longer occurs in the document.
    #[error("text {0:?} no longer occurs in the document")]
    AnchorNotFound(String),
    /// Another accept holds the apply lock.
    #[error("another suggestion is being applied")]
    ApplyInProgress,
    /// The caller addressed a different document or version.
    #[error("document mismatch: session holds {expected}, request named {found}")]
    DocumentMismatch { expected: String, found: String },
    /// No provider is registered (or enabled) for the channel.
    #[error("no provider registered for channel {0}")]
    UnknownChannel(Channel),
    #[error("session is closed")]
    SessionClosed,
    /// The editor applied an accepted replacement the document could not
    /// follow. The session needs a full [`sync_text`](crate::Session::sync_text).
    #[error("editor and document diverged while applying {id}: {reason}")]
    SurfaceDiverged { id: SuggestionId, reason: String },
    /// Refused until the editor's full text is synced back in.
    #[error("document is out of step with the editor; sync the full text first")]
    ResyncRequired,
    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),
    #[error("anchor failure: {0}")]
    Anchor(AnchorError),
    #[error("editor surface failure: {0}")]
    Surface(#[from] SurfaceError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<AnchorError> for EngineError {
    fn from(value: AnchorError) -> Self {
        match value {
            AnchorError::NotFound(text) => EngineError::AnchorNotFound(text),
            other => EngineError::Anchor(other),
        }
    }
}
