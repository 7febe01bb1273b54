//! Durable suggestion rows and dismissal records.
//!
//! The session never awaits a repository while it holds its state lock.
//! Writes are queued as [`RepoOp`]s in an [`Outbox`] under the lock and
//! flushed afterwards; a failed write is logged and the in-memory store stays
//! authoritative.

use std::collections::HashMap;
use std::sync::RwLock;

use anchor::{Fingerprint, Suggestion, SuggestionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("persistence backend failure: {0}")]
    Backend(String),
    #[error("persistence lock poisoned")]
    Poisoned,
    #[error("no stored row for suggestion {0}")]
    NotFound(SuggestionId),
}

impl PersistenceError {
    pub fn backend<T: Into<String>>(msg: T) -> Self {
        PersistenceError::Backend(msg.into())
    }
}

/// A dismissed suggestion, kept so the same flagged content is not offered
/// again in a later session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub suggestion_id: SuggestionId,
    pub document_id: String,
    pub fingerprint: Fingerprint,
    pub dismissed_at: DateTime<Utc>,
}

/// Storage for suggestion rows and dismissals.
#[async_trait]
pub trait SuggestionRepository: Send + Sync {
    async fn create(&self, suggestion: &Suggestion) -> Result<(), PersistenceError>;

    /// Rows for a document version that are neither accepted nor dismissed.
    async fn list_active(
        &self,
        document_id: &str,
        version: u32,
    ) -> Result<Vec<Suggestion>, PersistenceError>;

    async fn update(&self, suggestion: &Suggestion) -> Result<(), PersistenceError>;

    /// Delete rows by id; unknown ids are ignored.
    async fn delete_many(&self, ids: &[SuggestionId]) -> Result<(), PersistenceError>;

    /// Delete `superseded` and insert `fresh` as one step.
    async fn replace_superseded(
        &self,
        document_id: &str,
        superseded: &[SuggestionId],
        fresh: &[Suggestion],
    ) -> Result<(), PersistenceError>;

    async fn record_dismissal(&self, record: &DismissalRecord) -> Result<(), PersistenceError>;

    async fn list_dismissals(
        &self,
        document_id: &str,
    ) -> Result<Vec<DismissalRecord>, PersistenceError>;
}

/// An in-memory repository using `RwLock`s around `HashMap`s.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    rows: RwLock<HashMap<SuggestionId, Suggestion>>,
    dismissals: RwLock<Vec<DismissalRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row, resolved or not.
    pub fn all_rows(&self) -> Vec<Suggestion> {
        let guard = match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut rows: Vec<Suggestion> = guard.values().cloned().collect();
        rows.sort_by_key(|row| row.range.start);
        rows
    }
}

#[async_trait]
impl SuggestionRepository for InMemoryRepository {
    async fn create(&self, suggestion: &Suggestion) -> Result<(), PersistenceError> {
        self.rows
            .write()
            .map_err(|_| PersistenceError::Poisoned)?
            .insert(suggestion.id.clone(), suggestion.clone());
        Ok(())
    }

    async fn list_active(
        &self,
        document_id: &str,
        version: u32,
    ) -> Result<Vec<Suggestion>, PersistenceError> {
        let guard = self.rows.read().map_err(|_| PersistenceError::Poisoned)?;
        let mut rows: Vec<Suggestion> = guard
            .values()
            .filter(|row| {
                row.document_id == document_id && row.version == version && !row.is_resolved()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.range.start);
        Ok(rows)
    }

    async fn update(&self, suggestion: &Suggestion) -> Result<(), PersistenceError> {
        let mut guard = self.rows.write().map_err(|_| PersistenceError::Poisoned)?;
        match guard.get_mut(&suggestion.id) {
            Some(row) => {
                *row = suggestion.clone();
                Ok(())
            }
            None => Err(PersistenceError::NotFound(suggestion.id.clone())),
        }
    }

    async fn delete_many(&self, ids: &[SuggestionId]) -> Result<(), PersistenceError> {
        let mut guard = self.rows.write().map_err(|_| PersistenceError::Poisoned)?;
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }

    async fn replace_superseded(
        &self,
        document_id: &str,
        superseded: &[SuggestionId],
        fresh: &[Suggestion],
    ) -> Result<(), PersistenceError> {
        // One write lock for the whole swap.
        let mut guard = self.rows.write().map_err(|_| PersistenceError::Poisoned)?;
        for id in superseded {
            if guard
                .get(id)
                .is_some_and(|row| row.document_id == document_id)
            {
                guard.remove(id);
            }
        }
        for row in fresh {
            guard.insert(row.id.clone(), row.clone());
        }
        Ok(())
    }

    async fn record_dismissal(&self, record: &DismissalRecord) -> Result<(), PersistenceError> {
        let mut guard = self
            .dismissals
            .write()
            .map_err(|_| PersistenceError::Poisoned)?;
        if !guard
            .iter()
            .any(|existing| existing.suggestion_id == record.suggestion_id)
        {
            guard.push(record.clone());
        }
        Ok(())
    }

    async fn list_dismissals(
        &self,
        document_id: &str,
    ) -> Result<Vec<DismissalRecord>, PersistenceError> {
        let guard = self
            .dismissals
            .read()
            .map_err(|_| PersistenceError::Poisoned)?;
        Ok(guard
            .iter()
            .filter(|record| record.document_id == document_id)
            .cloned()
            .collect())
    }
}

/// A repository write queued while the session state lock was held.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoOp {
    Create(Suggestion),
    Update(Suggestion),
    Delete(Vec<SuggestionId>),
    ReplaceSuperseded {
        document_id: String,
        superseded: Vec<SuggestionId>,
        fresh: Vec<Suggestion>,
    },
    Dismiss(DismissalRecord),
}

impl RepoOp {
    fn label(&self) -> &'static str {
        match self {
            RepoOp::Create(_) => "create",
            RepoOp::Update(_) => "update",
            RepoOp::Delete(_) => "delete_many",
            RepoOp::ReplaceSuperseded { .. } => "replace_superseded",
            RepoOp::Dismiss(_) => "record_dismissal",
        }
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    ops: Vec<RepoOp>,
}

impl Outbox {
    pub fn push(&mut self, op: RepoOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn drain(&mut self) -> Vec<RepoOp> {
        std::mem::take(&mut self.ops)
    }
}

/// Apply queued writes in order. Failures are logged and counted; later ops
/// still run.
pub async fn flush(repository: &dyn SuggestionRepository, ops: Vec<RepoOp>) -> usize {
    let mut failures = 0;
    for op in ops {
        let result = match &op {
            RepoOp::Create(row) => repository.create(row).await,
            RepoOp::Update(row) => repository.update(row).await,
            RepoOp::Delete(ids) => repository.delete_many(ids).await,
            RepoOp::ReplaceSuperseded {
                document_id,
                superseded,
                fresh,
            } => {
                repository
                    .replace_superseded(document_id, superseded, fresh)
                    .await
            }
            RepoOp::Dismiss(record) => repository.record_dismissal(record).await,
        };
        if let Err(err) = result {
            failures += 1;
            warn!(op = op.label(), error = %err, "persistence_write_failed");
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor::{Category, Channel, TextRange};

    fn row(id: &str, start: usize) -> Suggestion {
        Suggestion::new("doc", 1, Channel::Spelling, Category::Spelling, TextRange {
            start,
            end: start + 3,
        })
        .with_id(id)
        .with_original("teh")
    }

    #[tokio::test]
    async fn list_active_excludes_resolved_rows() {
        let repo = InMemoryRepository::new();
        repo.create(&row("a", 0)).await.unwrap();
        let mut accepted = row("b", 5);
        accepted.flags.accepted = true;
        repo.create(&accepted).await.unwrap();
        repo.create(&row("c", 9)).await.unwrap();

        let active = repo.list_active("doc", 1).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(repo.list_active("doc", 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_row_fails() {
        let repo = InMemoryRepository::new();
        let err = repo.update(&row("ghost", 0)).await.unwrap_err();
        assert_eq!(err, PersistenceError::NotFound("ghost".into()));
    }

    #[tokio::test]
    async fn replace_superseded_swaps_rows() {
        let repo = InMemoryRepository::new();
        repo.create(&row("old", 0)).await.unwrap();
        repo.replace_superseded("doc", &["old".into()], &[row("new", 0)])
            .await
            .unwrap();
        let ids: Vec<String> = repo
            .all_rows()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn dismissals_are_recorded_once_per_id() {
        let repo = InMemoryRepository::new();
        let record = DismissalRecord {
            suggestion_id: "a".into(),
            document_id: "doc".into(),
            fingerprint: Fingerprint::Content("abc".into()),
            dismissed_at: Utc::now(),
        };
        repo.record_dismissal(&record).await.unwrap();
        repo.record_dismissal(&record).await.unwrap();
        assert_eq!(repo.list_dismissals("doc").await.unwrap().len(), 1);
        assert!(repo.list_dismissals("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_continues_past_failures() {
        let repo = InMemoryRepository::new();
        let mut outbox = Outbox::default();
        outbox.push(RepoOp::Update(row("missing", 0)));
        outbox.push(RepoOp::Create(row("a", 0)));
        assert_eq!(outbox.len(), 2);
        let failures = flush(&repo, outbox.drain()).await;
        assert_eq!(failures, 1);
        assert!(outbox.is_empty());
        assert_eq!(repo.all_rows().len(), 1);
    }
}
