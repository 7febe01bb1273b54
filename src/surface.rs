//! The editor seam: where accepted replacements land and where decorations
//! are drawn.

use std::sync::Mutex;

use anchor::{Category, StructuralRange, SuggestionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SurfaceError {
    /// The editor refused the transaction (read-only, range out of date).
    #[error("editor rejected the change: {0}")]
    Rejected(String),
    #[error("editor surface unavailable")]
    Unavailable,
}

/// One highlighted span, in structural coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub start: usize,
    pub end: usize,
    pub suggestion_id: SuggestionId,
    pub category: Category,
}

#[async_trait]
pub trait EditorSurface: Send + Sync {
    /// Replace `range` with `text` as a single editor transaction.
    async fn replace_range(&self, range: StructuralRange, text: &str) -> Result<(), SurfaceError>;

    /// Put the caret back at a structural position.
    async fn restore_selection(&self, position: usize) -> Result<(), SurfaceError>;

    /// Replace the full decoration set.
    async fn decorate(&self, decorations: &[Decoration]) -> Result<(), SurfaceError>;
}

/// A surface that accepts every call and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

#[async_trait]
impl EditorSurface for NullSurface {
    async fn replace_range(&self, _range: StructuralRange, _text: &str) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn restore_selection(&self, _position: usize) -> Result<(), SurfaceError> {
        Ok(())
    }

    async fn decorate(&self, _decorations: &[Decoration]) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// A call observed by [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Replace { range: StructuralRange, text: String },
    RestoreSelection(usize),
    Decorate(Vec<Decoration>),
}

/// Records every call; can be told to reject replacements. Handy for hosts
/// that want to inspect what the engine pushed.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    reject_replace: Mutex<Option<String>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_replacements(&self, reason: impl Into<String>) {
        *self.lock_reject() = Some(reason.into());
    }

    pub fn accept_replacements(&self) {
        *self.lock_reject() = None;
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock_calls().clone()
    }

    pub fn last_decorations(&self) -> Option<Vec<Decoration>> {
        self.lock_calls().iter().rev().find_map(|call| match call {
            SurfaceCall::Decorate(set) => Some(set.clone()),
            _ => None,
        })
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<SurfaceCall>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_reject(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.reject_replace
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl EditorSurface for RecordingSurface {
    async fn replace_range(&self, range: StructuralRange, text: &str) -> Result<(), SurfaceError> {
        if let Some(reason) = self.lock_reject().clone() {
            return Err(SurfaceError::Rejected(reason));
        }
        self.lock_calls().push(SurfaceCall::Replace {
            range,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn restore_selection(&self, position: usize) -> Result<(), SurfaceError> {
        self.lock_calls().push(SurfaceCall::RestoreSelection(position));
        Ok(())
    }

    async fn decorate(&self, decorations: &[Decoration]) -> Result<(), SurfaceError> {
        self.lock_calls()
            .push(SurfaceCall::Decorate(decorations.to_vec()));
        Ok(())
    }
}
