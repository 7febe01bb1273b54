//! reqwest-backed checker provider.
//!
//! One instance owns its client, circuit breaker, token bucket, and retry
//! policy. Nothing is shared through process globals.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{HttpProviderConfig, HttpProviderKind};
use crate::error::ProviderError;
use crate::provider::CheckerProvider;
use crate::resilience::{execute_with_retry, CircuitBreaker, TokenBucket};
use crate::types::{CheckRequest, ProviderResponse};

#[derive(Debug)]
pub struct HttpProvider {
    config: HttpProviderConfig,
    endpoint: String,
    client: reqwest::Client,
    breaker: CircuitBreaker,
    bucket: TokenBucket,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ProviderError::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint(),
            breaker: CircuitBreaker::new(config.name.clone(), config.circuit_breaker),
            bucket: TokenBucket::new(config.rate_limit),
            client,
            config,
        })
    }

    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn send_once(&self, request: &CheckRequest) -> Result<ProviderResponse, ProviderError> {
        let language = if request.language.is_empty() {
            self.config.language.as_str()
        } else {
            request.language.as_str()
        };

        let mut builder = self.client.post(&self.endpoint);
        if let Some(header) = self.config.auth_header.as_deref() {
            builder = builder.header("Authorization", header);
        }
        builder = match self.config.kind {
            HttpProviderKind::LanguageTool => builder.form(&[
                ("text", request.text.as_str()),
                ("language", language),
            ]),
            HttpProviderKind::Json => builder.json(&json!({
                "text": request.text,
                "language": language,
                "channel": request.channel,
            })),
        };

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Parse(format!("invalid JSON response: {e}")))?;
        ProviderResponse::from_value(value)
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.config.request_timeout.as_millis() as u64)
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

#[async_trait]
impl CheckerProvider for HttpProvider {
    fn id(&self) -> &str {
        &self.config.name
    }

    async fn check(&self, request: &CheckRequest) -> Result<ProviderResponse, ProviderError> {
        if !self.breaker.allow_request() {
            return Err(ProviderError::CircuitOpen(self.config.name.clone()));
        }
        if !self.bucket.acquire().await {
            return Err(ProviderError::RateLimited(self.config.name.clone()));
        }

        let outcome = execute_with_retry(&self.config.retry, move |attempt| async move {
            if attempt > 0 {
                debug!(provider = %self.config.name, attempt, "provider_retry_attempt");
            }
            self.send_once(request).await
        })
        .await;

        match outcome.result {
            Ok(response) => {
                self.breaker.record_success();
                debug!(
                    provider = %self.config.name,
                    channel = %request.channel,
                    items = response.items.len(),
                    attempts = outcome.attempts,
                    "provider_response"
                );
                Ok(response)
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!(
                    provider = %self.config.name,
                    channel = %request.channel,
                    attempts = outcome.attempts,
                    error = %err,
                    "provider_failure"
                );
                Err(err)
            }
        }
    }
}
