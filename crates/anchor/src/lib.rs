//! Proofline anchoring layer.
//!
//! Everything here is about *where* a suggestion lives in a document that
//! keeps changing under it. Nothing here talks to a provider or does I/O.
//!
//! ## What we do
//!
//! - Plain-text projection of the document with a revision counter and cursor
//! - One [`MutationEvent`] per edit, incremental or diffed from a full re-sync
//! - Plain-text to structural position mapping ([`BlockLayout`])
//! - Content fingerprints that identify a flagged span independent of ids
//! - Range mapping, snapshot validation, and exact-text re-anchoring
//!
//! ## Invariants worth knowing
//!
//! - All offsets count `char`s, never bytes or UTF-16 units
//! - Ranges are half-open and non-empty (`start < end`)
//! - Fingerprint = SHA-256(version || 0x02 || prefix|original|suffix)

mod document;
mod error;
mod fingerprint;
mod layout;
mod reconcile;
pub mod text;
mod types;

pub use crate::document::{diff_edit, Document, Edit, MutationEvent};
pub use crate::error::{AnchorError, ValidationError};
pub use crate::fingerprint::{
    compute_fingerprint, fingerprint_key, Fingerprint, DEFAULT_WINDOW, FINGERPRINT_VERSION,
};
pub use crate::layout::{BlockLayout, StructuralRange};
pub use crate::reconcile::{
    check_anchor, check_range, is_same_edit, locate_by_text, map_range, EditShape, LocateStrategy,
    Located, Mapping, DEFAULT_DUPLICATE_TOLERANCE,
};
pub use crate::types::{Category, Channel, Suggestion, SuggestionFlags, SuggestionId, TextRange};
