use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderError;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};

/// Wire protocol spoken by an HTTP provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpProviderKind {
    /// Form POST of `text` and `language` to `{base_url}/v2/check`.
    #[default]
    LanguageTool,
    /// JSON POST of `{text, language, channel}` to `base_url`.
    Json,
}

/// Settings for one HTTP provider instance, resilience included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    pub name: String,
    pub kind: HttpProviderKind,
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header.
    pub auth_header: Option<String>,
    pub language: String,
    #[serde(with = "crate::serde_millis")]
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            name: "languagetool".to_string(),
            kind: HttpProviderKind::LanguageTool,
            base_url: String::new(),
            auth_header: None,
            language: "en-US".to_string(),
            request_timeout: Duration::from_secs(8),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl HttpProviderConfig {
    pub fn new(kind: HttpProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = Some(header.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.base_url.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("base_url must not be empty".into()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ProviderError::InvalidConfig(format!(
                "base_url must be http(s): {}",
                self.base_url
            )));
        }
        if self.name.trim().is_empty() {
            return Err(ProviderError::InvalidConfig("name must not be empty".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ProviderError::InvalidConfig(
                "request_timeout must be positive".into(),
            ));
        }
        let rps = self.rate_limit.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ProviderError::InvalidConfig(
                "rate_limit.requests_per_second must be positive".into(),
            ));
        }
        Ok(())
    }

    /// URL the provider posts to.
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.kind {
            HttpProviderKind::LanguageTool if base.ends_with("/v2/check") => base.to_string(),
            HttpProviderKind::LanguageTool => format!("{base}/v2/check"),
            HttpProviderKind::Json => base.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tool_endpoint_appends_check_path() {
        let cfg = HttpProviderConfig::new(HttpProviderKind::LanguageTool, "http://localhost:8081/");
        assert_eq!(cfg.endpoint(), "http://localhost:8081/v2/check");

        let cfg = HttpProviderConfig::new(
            HttpProviderKind::LanguageTool,
            "https://api.languagetool.org/v2/check",
        );
        assert_eq!(cfg.endpoint(), "https://api.languagetool.org/v2/check");
    }

    #[test]
    fn json_endpoint_is_used_verbatim() {
        let cfg = HttpProviderConfig::new(HttpProviderKind::Json, "https://checker.local/api/check");
        assert_eq!(cfg.endpoint(), "https://checker.local/api/check");
    }

    #[test]
    fn validate_rejects_missing_url() {
        let err = HttpProviderConfig::default().validate().unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig(_)));

        let err = HttpProviderConfig::new(HttpProviderKind::Json, "ftp://x")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("http(s)"));

        assert!(HttpProviderConfig::new(HttpProviderKind::Json, "http://x")
            .validate()
            .is_ok());
    }
}
