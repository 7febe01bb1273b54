use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{CheckRequest, ProviderResponse};

/// Something that can look at a text and report raw matches.
///
/// Implementations must be cancel-safe: the engine drops the future when the
/// user keeps typing.
#[async_trait]
pub trait CheckerProvider: Send + Sync {
    /// Short stable name used in logs and breaker bookkeeping.
    fn id(&self) -> &str;

    async fn check(&self, request: &CheckRequest) -> Result<ProviderResponse, ProviderError>;
}
