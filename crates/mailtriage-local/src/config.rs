//! Environment-driven configuration.
//!
//! Every knob has a safe default; numeric values are clamped so a typo cannot produce a
//! zero timeout or an unbounded buffer.

use mailtriage_core::{Error, Result};
use std::time::Duration;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

pub(crate) fn env_usize(key: &str, default: usize, min: usize, max: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

/// What to do with a source whose extraction failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the source from the text stream and report it.
    #[default]
    Skip,
    /// Fold a diagnostic line into the text stream (legacy behaviour).
    Inline,
    /// Fail the whole request.
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "inline" => Ok(Self::Inline),
            "abort" => Ok(Self::Abort),
            other => Err(Error::Config(format!(
                "unknown source failure policy {other:?} (allowed: skip, inline, abort)"
            ))),
        }
    }
}

/// What to do with an attachment whose extension is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Fold the fixed "Unsupported file format" sentinel into the text stream.
    #[default]
    Placeholder,
    Skip,
    Abort,
}

impl std::str::FromStr for UnsupportedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(Error::Config(format!(
                "unknown unsupported-format policy {other:?} (allowed: placeholder, skip, abort)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePolicy {
    pub on_failure: FailurePolicy,
    pub on_unsupported: UnsupportedPolicy,
}

impl SourcePolicy {
    pub fn from_env() -> Result<Self> {
        let on_failure = match env("MAILTRIAGE_ON_SOURCE_ERROR") {
            Some(s) => s.parse()?,
            None => FailurePolicy::default(),
        };
        let on_unsupported = match env("MAILTRIAGE_ON_UNSUPPORTED") {
            Some(s) => s.parse()?,
            None => UnsupportedPolicy::default(),
        };
        Ok(Self {
            on_failure,
            on_unsupported,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Delay before the single retry.
    pub backoff: Duration,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env("MAILTRIAGE_GEMINI_API_KEY").or_else(|| env("GEMINI_API_KEY")),
            base_url: env("MAILTRIAGE_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            model: env("MAILTRIAGE_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            timeout: Duration::from_millis(env_u64("MAILTRIAGE_GEMINI_TIMEOUT_MS", 20_000, 200, 120_000)),
            backoff: Duration::from_millis(env_u64("MAILTRIAGE_GEMINI_BACKOFF_MS", 500, 0, 10_000)),
        }
    }

    /// Redacted view for diagnostics output.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "api_key_configured": self.api_key.is_some(),
            "base_url": self.base_url,
            "model": self.model,
            "timeout_ms": self.timeout.as_millis() as u64,
            "backoff_ms": self.backoff.as_millis() as u64,
        })
    }
}
