//! Proofline checker providers.
//!
//! Talks to whatever decides what is wrong with a text and turns its answer
//! into something the engine can anchor.
//!
//! ## What lives here
//!
//! - [`CheckerProvider`]: the async seam every analyzer sits behind
//! - [`RawProviderMatch`]: the closed set of payload shapes we accept
//! - [`normalize_response`]: per-item validation into [`NormalizedMatch`]
//! - [`HttpProvider`] (feature `http`): LanguageTool or a JSON endpoint, with
//!   its own retry, circuit breaker, and rate limiter
//! - [`DictionaryProvider`]: offline phrase table for demos and tests
//!
//! Offsets leaving this crate always count `char`s. LanguageTool's UTF-16
//! offsets are converted during normalization.

mod config;
mod dictionary;
mod error;
mod normalize;
mod provider;
pub mod resilience;
mod serde_millis;
mod types;

#[cfg(feature = "http")]
mod http;

pub use crate::config::{HttpProviderConfig, HttpProviderKind};
pub use crate::dictionary::{DictionaryEntry, DictionaryProvider};
pub use crate::error::ProviderError;
pub use crate::normalize::{channel_category, normalize_response, NormalizeReport};
pub use crate::provider::CheckerProvider;
pub use crate::types::{
    CheckRequest, GenericMatch, LanguageToolMatch, LtCategory, LtReplacement, LtRule,
    NormalizedMatch, ProviderResponse, RawProviderMatch, SpanMatch,
};

#[cfg(feature = "http")]
pub use crate::http::HttpProvider;
