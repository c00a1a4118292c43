//! Advisory Client
//!
//! Blocking `generateContent` client. Never on the detection path: the
//! pipeline hands prompts to a separate thread (see `pipeline::runner`).

use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_ADVISORY_BASE_URL, DEFAULT_ADVISORY_MAX_TOKENS, DEFAULT_ADVISORY_MODEL,
    DEFAULT_ADVISORY_TIMEOUT_SECS,
};

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    /// Full endpoint; overrides `base_url` + `model`
    pub api_url: Option<String>,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            model: DEFAULT_ADVISORY_MODEL.to_string(),
            base_url: DEFAULT_ADVISORY_BASE_URL.to_string(),
            api_url: None,
            timeout_secs: DEFAULT_ADVISORY_TIMEOUT_SECS,
            max_output_tokens: DEFAULT_ADVISORY_MAX_TOKENS,
        }
    }
}

impl AdvisoryConfig {
    pub fn endpoint(&self) -> String {
        match &self.api_url {
            Some(url) => url.clone(),
            None => format!(
                "{}/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            ),
        }
    }
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("advisory API key not configured")]
    NotConfigured,

    #[error("advisory request failed: {0}")]
    Transport(String),

    #[error("advisory service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("unreadable advisory response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryReply {
    pub status_code: u16,
    pub text: String,
    pub raw: serde_json::Value,
}

impl AdvisoryReply {
    /// A body that is not JSON is passed through as plain text
    pub fn from_body(status_code: u16, body: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(raw) => Self { status_code, text: extract_text(&raw), raw },
            Err(_) => Self { status_code, text: body, raw: serde_json::Value::Null },
        }
    }
}

pub struct AdvisoryClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    max_output_tokens: u32,
}

impl AdvisoryClient {
    pub fn new(config: &AdvisoryConfig) -> Result<Self, AdvisoryError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AdvisoryError::NotConfigured)?;

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Ok(Self {
            agent,
            endpoint: config.endpoint(),
            api_key,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one prompt and extract the reply text
    pub fn ask(&self, prompt: &str) -> Result<AdvisoryReply, AdvisoryError> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.max_output_tokens },
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .set("x-goog-api-key", &self.api_key)
            .send_json(body);

        match response {
            Ok(resp) => {
                let status_code = resp.status();
                let body = resp
                    .into_string()
                    .map_err(|e| AdvisoryError::InvalidResponse(e.to_string()))?;
                Ok(AdvisoryReply::from_body(status_code, body))
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let detail = serde_json::from_str::<serde_json::Value>(&body)
                    .map(|v| extract_text(&v))
                    .unwrap_or(body);
                Err(AdvisoryError::Http { status, body: detail })
            }
            Err(e) => Err(AdvisoryError::Transport(e.to_string())),
        }
    }
}

// ============================================================================
// RESPONSE PARSING
// ============================================================================

/// Pull human-readable text out of the various response shapes
pub fn extract_text(resp: &serde_json::Value) -> String {
    if let Some(candidates) = resp.get("candidates").and_then(|c| c.as_array()) {
        let pieces: Vec<String> = candidates.iter().filter_map(candidate_text).collect();
        return pieces.join("\n");
    }
    if let Some(s) = resp.get("output").and_then(|v| v.as_str()) {
        return s.to_string();
    }
    if let Some(s) = resp.get("content").and_then(|v| v.as_str()) {
        return s.to_string();
    }
    if let Some(gens) = resp.get("generations").and_then(|g| g.as_array()) {
        return gens
            .iter()
            .map(|g| g.get("text").and_then(|t| t.as_str()).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ");
    }
    serde_json::to_string_pretty(resp).unwrap_or_else(|_| resp.to_string())
}

fn candidate_text(candidate: &serde_json::Value) -> Option<String> {
    let content = candidate.get("content");

    // { content: { parts: [{ text }] } }
    if let Some(parts) = content.and_then(|c| c.get("parts")).and_then(|p| p.as_array()) {
        let text: String = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect();
        if !text.is_empty() {
            return Some(text);
        }
    }

    content
        .and_then(|c| c.as_str())
        .or_else(|| candidate.get("text").and_then(|t| t.as_str()))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_gemini_parts() {
        let resp = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "1. Check " }, { "text": "firewall" }] } },
                { "content": { "parts": [{ "text": "2. Rotate keys" }] } }
            ]
        });
        assert_eq!(extract_text(&resp), "1. Check firewall\n2. Rotate keys");
    }

    #[test]
    fn test_extract_fallback_shapes() {
        assert_eq!(extract_text(&json!({ "candidates": [{ "content": "a" }, { "text": "b" }] })), "a\nb");
        assert_eq!(extract_text(&json!({ "output": "out" })), "out");
        assert_eq!(extract_text(&json!({ "content": "c" })), "c");
        assert_eq!(extract_text(&json!({ "generations": [{ "text": "x" }, { "text": "y" }] })), "x y");

        let odd = json!({ "weird": 1 });
        assert_eq!(extract_text(&odd), serde_json::to_string_pretty(&odd).unwrap());
    }

    #[test]
    fn test_plain_text_body_passed_through() {
        let reply = AdvisoryReply::from_body(200, "Isolate the host first.".to_string());
        assert_eq!(reply.text, "Isolate the host first.");
        assert_eq!(reply.raw, serde_json::Value::Null);

        let reply = AdvisoryReply::from_body(200, r#"{"output":"ok"}"#.to_string());
        assert_eq!(reply.text, "ok");
        assert_eq!(reply.raw["output"], "ok");
    }

    #[test]
    fn test_endpoint() {
        let config = AdvisoryConfig::default();
        assert_eq!(
            config.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );

        let custom = AdvisoryConfig { api_url: Some("http://localhost:9/x".to_string()), ..config };
        assert_eq!(custom.endpoint(), "http://localhost:9/x");
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = AdvisoryConfig { enabled: true, api_key: Some("  ".to_string()), ..Default::default() };
        assert!(matches!(AdvisoryClient::new(&config), Err(AdvisoryError::NotConfigured)));
    }

    #[test]
    fn test_transport_error_is_structured() {
        let config = AdvisoryConfig {
            enabled: true,
            api_key: Some("k".to_string()),
            api_url: Some("http://127.0.0.1:1/generate".to_string()),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = AdvisoryClient::new(&config).unwrap();
        assert!(matches!(client.ask("hi"), Err(AdvisoryError::Transport(_))));
    }
}
