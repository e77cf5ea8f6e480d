//! Gemini `generateContent` classifier.
//!
//! One logical call per communication: an explicit per-request timeout, and at most one
//! retry (after a fixed backoff) for failures that are plausibly transient. A structurally
//! odd 2xx response is not a failure; it resolves to the "Edge Case" fallback.

use crate::config::GeminiConfig;
use mailtriage_core::classify::{build_prompt, edge_case, parse_generation_response};
use mailtriage_core::{ClassificationResult, Classifier, Error, Result, Taxonomy};
use serde::Serialize;

const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Serialize)]
struct ReqPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct ReqContent {
    parts: Vec<ReqPart>,
}

#[derive(Debug, Serialize)]
struct GeminiReq {
    contents: Vec<ReqContent>,
}

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    Retryable(String),
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct GeminiClassifier {
    client: reqwest::Client,
    cfg: GeminiConfig,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(client: reqwest::Client, cfg: GeminiConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            Error::NotConfigured(
                "missing MAILTRIAGE_GEMINI_API_KEY (or GEMINI_API_KEY)".to_string(),
            )
        })?;
        tracing::debug!(config = %cfg.describe(), "gemini classifier configured");
        Ok(Self {
            client,
            cfg,
            api_key,
        })
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        Self::new(client, GeminiConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/models/{}:generateContent",
            self.cfg.base_url.trim_end_matches('/'),
            self.cfg.model
        )
    }

    async fn attempt(&self, req: &GeminiReq) -> std::result::Result<serde_json::Value, AttemptError> {
        let resp = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.cfg.timeout)
            .json(req)
            .send()
            .await
            // Strip the URL: it carries the key as a query parameter.
            .map_err(|e| AttemptError::Retryable(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let msg = format!("generateContent HTTP {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                AttemptError::Retryable(msg)
            } else {
                AttemptError::Fatal(msg)
            });
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AttemptError::Retryable(e.without_url().to_string()))?;
        // A body that is not JSON at all is treated like a JSON body with no candidates.
        Ok(serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait::async_trait]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn classify(&self, masked: &str, taxonomy: &Taxonomy) -> Result<ClassificationResult> {
        let req = GeminiReq {
            contents: vec![ReqContent {
                parts: vec![ReqPart {
                    text: build_prompt(masked, taxonomy),
                }],
            }],
        };

        let mut last = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&req).await {
                Ok(v) => {
                    let out = parse_generation_response(&v, taxonomy);
                    if out == edge_case() {
                        tracing::info!(attempt, "generation response had no usable category");
                    }
                    return Ok(out);
                }
                Err(AttemptError::Fatal(msg)) => {
                    tracing::warn!(attempt, error = %msg, "classifier request rejected");
                    return Err(Error::Service(msg));
                }
                Err(AttemptError::Retryable(msg)) => {
                    tracing::warn!(attempt, error = %msg, "classifier request failed");
                    last = msg;
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(self.cfg.backoff).await;
                    }
                }
            }
        }
        Err(Error::ServiceUnavailable {
            attempts: MAX_ATTEMPTS,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(key: Option<&str>) -> GeminiConfig {
        GeminiConfig {
            api_key: key.map(str::to_string),
            base_url: "http://127.0.0.1:9/".to_string(),
            model: "gemini-test".to_string(),
            timeout: Duration::from_millis(500),
            backoff: Duration::ZERO,
        }
    }

    #[test]
    fn missing_key_is_not_configured() {
        let r = GeminiClassifier::new(reqwest::Client::new(), cfg(None));
        assert!(matches!(r, Err(Error::NotConfigured(_))));
    }

    #[test]
    fn endpoint_trims_trailing_slash_and_names_model() {
        let c = GeminiClassifier::new(reqwest::Client::new(), cfg(Some("k"))).unwrap();
        assert_eq!(
            c.endpoint(),
            "http://127.0.0.1:9/v1/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn request_body_has_single_prompt_part() {
        let req = GeminiReq {
            contents: vec![ReqContent {
                parts: vec![ReqPart {
                    text: "p".to_string(),
                }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"contents": [{"parts": [{"text": "p"}]}]})
        );
    }
}
