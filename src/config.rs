//! YAML configuration for the suggestion engine.
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working engine. Durations are plain milliseconds.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "desktop editor"
//! log_level: "info"
//! language: "en-US"
//!
//! fingerprint:
//!   window: 10
//!
//! reconcile:
//!   grace_period_ms: 1500
//!   duplicate_tolerance: 10
//!   prefer_nearest_occurrence: false
//!
//! apply:
//!   settle_delay_ms: 10
//!
//! channels:
//!   spelling:
//!     debounce_ms: 400
//!   grammar:
//!     debounce_ms: 1000
//!     idle_fallback_ms: 1000
//!   style:
//!     enabled: false
//!
//! provider:
//!   kind: "http"
//!   http:
//!     name: "languagetool"
//!     kind: "language_tool"
//!     base_url: "http://localhost:8081"
//!     request_timeout: 8000
//! ```
//!
//! `PROOFLINE_PROVIDER_URL`, `PROOFLINE_PROVIDER_TOKEN`, and `PROOFLINE_LOG`
//! override the file when set.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anchor::{Channel, LocateStrategy, DEFAULT_DUPLICATE_TOLERANCE, DEFAULT_WINDOW};
use checker::HttpProviderConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PROVIDER_URL: &str = "PROOFLINE_PROVIDER_URL";
pub const ENV_PROVIDER_TOKEN: &str = "PROOFLINE_PROVIDER_TOKEN";
pub const ENV_LOG: &str = "PROOFLINE_LOG";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: String,
    pub name: Option<String>,
    /// `EnvFilter` directive used by the binary.
    pub log_level: String,
    /// Language tag sent with every check request.
    pub language: String,
    pub fingerprint: FingerprintConfig,
    pub reconcile: ReconcileConfig,
    pub apply: ApplyConfig,
    pub channels: ChannelsConfig,
    pub provider: ProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            log_level: "info".to_string(),
            language: "en-US".to_string(),
            fingerprint: FingerprintConfig::default(),
            reconcile: ReconcileConfig::default(),
            apply: ApplyConfig::default(),
            channels: ChannelsConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        // An empty document deserializes to unit, not to an empty map.
        let config: EngineConfig = if yaml.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROOFLINE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigLoadError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PROVIDER_URL).filter(|v| !v.trim().is_empty()) {
            self.provider.kind = ProviderKind::Http;
            self.provider.http.base_url = url;
        }
        if let Some(token) = lookup(ENV_PROVIDER_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.provider.http.auth_header = Some(format!("Bearer {token}"));
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        if self.log_level.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "log_level must not be empty".into(),
            ));
        }
        if self.language.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "language must not be empty".into(),
            ));
        }

        self.fingerprint.validate()?;
        self.channels.validate()?;
        self.provider.validate()?;
        Ok(())
    }

    /// Resolved timing for one channel.
    pub fn channel(&self, channel: Channel) -> ChannelSettings {
        self.channels.get(channel).resolve(channel)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.reconcile.grace_period_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.apply.settle_delay_ms)
    }

    pub fn locate_strategy(&self) -> LocateStrategy {
        if self.reconcile.prefer_nearest_occurrence {
            LocateStrategy::Nearest
        } else {
            LocateStrategy::First
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Context chars taken on each side of a flagged span.
    pub window: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }
}

impl FingerprintConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.window == 0 {
            return Err(ConfigLoadError::Validation(
                "fingerprint.window must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How long a suggestion may stay invalid before it is purged.
    pub grace_period_ms: u64,
    /// Range widening used by duplicate detection.
    pub duplicate_tolerance: usize,
    /// Re-anchor to the occurrence nearest the stored offset instead of the
    /// first one.
    pub prefer_nearest_occurrence: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 1500,
            duplicate_tolerance: DEFAULT_DUPLICATE_TOLERANCE,
            prefer_nearest_occurrence: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Pause between the replacement and the cursor restore.
    pub settle_delay_ms: u64,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self { settle_delay_ms: 10 }
    }
}

/// Per-channel overrides as written in YAML. Missing fields fall back to the
/// channel's own defaults (see [`ChannelSettings::defaults_for`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelYamlConfig {
    pub enabled: Option<bool>,
    pub debounce_ms: Option<u64>,
    /// `0` disables the idle fallback.
    pub idle_fallback_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    /// Inserted chars at which an edit counts as a paste.
    pub paste_threshold: Option<usize>,
}

impl ChannelYamlConfig {
    pub fn resolve(&self, channel: Channel) -> ChannelSettings {
        let defaults = ChannelSettings::defaults_for(channel);
        ChannelSettings {
            enabled: self.enabled.unwrap_or(defaults.enabled),
            debounce: self
                .debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            idle_fallback: match self.idle_fallback_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => defaults.idle_fallback,
            },
            cooldown: self
                .cooldown_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.cooldown),
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            paste_threshold: self.paste_threshold.unwrap_or(defaults.paste_threshold),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub spelling: ChannelYamlConfig,
    pub grammar: ChannelYamlConfig,
    pub style: ChannelYamlConfig,
}

impl ChannelsConfig {
    pub fn get(&self, channel: Channel) -> &ChannelYamlConfig {
        match channel {
            Channel::Spelling => &self.spelling,
            Channel::Grammar => &self.grammar,
            Channel::Style => &self.style,
        }
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        for channel in Channel::ALL {
            let settings = self.get(channel).resolve(channel);
            if settings.timeout.is_zero() {
                return Err(ConfigLoadError::Validation(format!(
                    "channels.{channel}.timeout_ms must be > 0"
                )));
            }
            if settings.paste_threshold == 0 {
                return Err(ConfigLoadError::Validation(format!(
                    "channels.{channel}.paste_threshold must be >= 1"
                )));
            }
        }
        Ok(())
    }
}

/// Runtime timing for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    pub enabled: bool,
    pub debounce: Duration,
    pub idle_fallback: Option<Duration>,
    /// Minimum spacing between immediate triggers.
    pub cooldown: Duration,
    pub timeout: Duration,
    pub paste_threshold: usize,
}

impl ChannelSettings {
    pub fn defaults_for(channel: Channel) -> Self {
        let (debounce, idle_fallback) = match channel {
            Channel::Spelling => (Duration::from_millis(400), None),
            Channel::Grammar | Channel::Style => (
                Duration::from_millis(1000),
                Some(Duration::from_millis(1000)),
            ),
        };
        Self {
            enabled: true,
            debounce,
            idle_fallback,
            cooldown: Duration::from_millis(1500),
            timeout: Duration::from_secs(8),
            paste_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Built-in phrase tables, no network.
    #[default]
    Dictionary,
    Http,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub http: HttpProviderConfig,
}

impl ProviderConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.kind {
            ProviderKind::Dictionary => Ok(()),
            ProviderKind::Http => self
                .http
                .validate()
                .map_err(|e| ConfigLoadError::Validation(format!("provider.http: {e}"))),
        }
    }
}
