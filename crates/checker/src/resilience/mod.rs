//! Per-provider resilience: retry with backoff, circuit breaking, and rate
//! limiting.
//!
//! Every piece here is owned by a provider instance. Two sessions talking to
//! the same endpoint through different providers never share breaker or
//! bucket state.

mod circuit_breaker;
mod rate_limit;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimitStats, TokenBucket};
pub use retry::{execute_with_retry, RetryConfig, RetryResult};
