//! LLM-backed classifier.
//!
//! Supports the **OpenAI Chat Completions API** (and compatible endpoints)
//! in JSON mode and the **Gemini `generateContent` API** with a JSON
//! response MIME type. The system prompt carries the candidate catalogue
//! and the user's connected apps.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use blimp_kernel::AppId;

use crate::classifier::{Classification, ClassificationRequest, Classifier, parse_classification};
use crate::error::{ResolutionError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Gemini API base URL.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sampling temperature for classification requests.
const DEFAULT_TEMPERATURE: f32 = 0.3;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which API the classifier talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI Chat Completions (also covers compatible endpoints).
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
}

#[derive(Debug, Clone)]
pub struct LlmClassifierConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Whole-request HTTP timeout.
    pub timeout: Duration,
}

impl LlmClassifierConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_provider(LlmProvider::OpenAi, api_key, model)
    }

    pub fn gemini(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_provider(LlmProvider::Gemini, api_key, model)
    }

    pub fn with_provider(
        provider: LlmProvider,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = match provider {
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Gemini => GEMINI_BASE_URL,
        };
        Self {
            provider,
            api_key: api_key.into(),
            base_url: base_url.to_owned(),
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classifier that delegates to a hosted LLM.
#[derive(Debug, Clone)]
pub struct LlmClassifier {
    config: LlmClassifierConfig,
    http: reqwest::Client,
}

impl LlmClassifier {
    pub fn new(config: LlmClassifierConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ResolutionError::ClassifierUnavailable {
                reason: "no API key configured".into(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResolutionError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let (url, mut headers, body) = match self.config.provider {
            LlmProvider::OpenAi => {
                let mut headers = HeaderMap::new();
                let auth_value = format!("Bearer {}", self.config.api_key);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth_value).map_err(|e| {
                        ResolutionError::Internal(format!("invalid authorization header: {e}"))
                    })?,
                );
                (
                    format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')),
                    headers,
                    openai_request_body(&self.config, system, user),
                )
            }
            LlmProvider::Gemini => (
                gemini_url(&self.config)?,
                HeaderMap::new(),
                gemini_request_body(&self.config, system, user),
            ),
        };

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(
            provider = ?self.config.provider,
            model = %self.config.model,
            "sending classification request"
        );

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolutionError::ClassifierUnavailable {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ResolutionError::ClassifierUnavailable {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(ResolutionError::ClassifierUnavailable {
                reason: format!("API returned {status}: {text}"),
            });
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| ResolutionError::MalformedResponse {
            reason: format!("invalid JSON envelope: {e}"),
        })?;

        match self.config.provider {
            LlmProvider::OpenAi => extract_openai_text(&v),
            LlmProvider::Gemini => extract_gemini_text(&v),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &'static str {
        match self.config.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Gemini => "gemini",
        }
    }

    async fn classify(&self, request: &ClassificationRequest) -> Result<Classification> {
        let system = system_prompt(request)?;
        let user = user_message(request);
        let text = self.complete(&system, &user).await?;
        let classification = parse_classification(&text)?;
        info!(
            classifier = self.name(),
            name = %classification.name,
            apps = ?classification.required_apps,
            "prompt classified"
        );
        Ok(classification)
    }
}

// ---------------------------------------------------------------------------
// Prompt building
// ---------------------------------------------------------------------------

fn system_prompt(request: &ClassificationRequest) -> Result<String> {
    let catalogue = serde_json::to_string_pretty(&request.catalogue)
        .map_err(|e| ResolutionError::Internal(format!("failed to encode catalogue: {e}")))?;
    let connected = if request.connected_apps.is_empty() {
        "None".to_string()
    } else {
        request
            .connected_apps
            .iter()
            .map(AppId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let supported = AppId::ALL
        .iter()
        .map(AppId::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        r#"You are a workflow automation analyst for Blimp, a platform that automates tasks
across third-party apps.

Given a user request, identify which apps the workflow needs and give it a clear name
and description.

Existing workflows:
{catalogue}

User's connected apps: {connected}

Supported app identifiers (use exactly these, lowercase): {supported}

Respond ONLY with a JSON object:
{{
  "required_apps": ["app1", "app2"],
  "name": "short workflow name",
  "description": "what the workflow does",
  "category": "category name"
}}"#
    ))
}

fn user_message(request: &ClassificationRequest) -> String {
    let context = if request.context.is_null() {
        "None".to_string()
    } else {
        request.context.to_string()
    };
    format!("User request: {}\n\nAdditional context: {context}", request.prompt)
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

fn openai_request_body(config: &LlmClassifierConfig, system: &str, user: &str) -> Value {
    json!({
        "model": config.model,
        "temperature": config.temperature,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
    })
}

fn gemini_request_body(config: &LlmClassifierConfig, system: &str, user: &str) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": system }] },
        "contents": [{ "role": "user", "parts": [{ "text": user }] }],
        "generationConfig": {
            "temperature": config.temperature,
            "responseMimeType": "application/json",
        },
    })
}

fn gemini_url(config: &LlmClassifierConfig) -> Result<String> {
    let raw = format!(
        "{}/models/{}:generateContent",
        config.base_url.trim_end_matches('/'),
        config.model
    );
    let mut url = url::Url::parse(&raw)
        .map_err(|e| ResolutionError::Internal(format!("invalid Gemini URL `{raw}`: {e}")))?;
    url.query_pairs_mut().append_pair("key", &config.api_key);
    Ok(url.into())
}

fn extract_openai_text(v: &Value) -> Result<String> {
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ResolutionError::MalformedResponse {
            reason: "missing `choices[0].message.content` in response".into(),
        })
}

fn extract_gemini_text(v: &Value) -> Result<String> {
    v["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| ResolutionError::MalformedResponse {
            reason: "missing `candidates[0].content.parts[0].text` in response".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CatalogueEntry;

    fn request() -> ClassificationRequest {
        ClassificationRequest {
            prompt: "turn my emails into calendar events".into(),
            context: json!({ "timezone": "UTC" }),
            catalogue: vec![CatalogueEntry {
                id: "t1".into(),
                name: "Email to Calendar".into(),
                required_apps: vec!["gmail".into(), "gcalendar".into()],
                category: "productivity".into(),
            }],
            connected_apps: vec![AppId::Gmail],
        }
    }

    #[test]
    fn empty_api_key_is_unavailable() {
        let err = LlmClassifier::new(LlmClassifierConfig::openai("", "gpt-4o-mini")).unwrap_err();
        assert!(matches!(err, ResolutionError::ClassifierUnavailable { .. }));
    }

    #[test]
    fn system_prompt_lists_catalogue_and_connections() {
        let prompt = system_prompt(&request()).unwrap();
        assert!(prompt.contains("Email to Calendar"));
        assert!(prompt.contains("User's connected apps: gmail"));
        assert!(prompt.contains("gcalendar, gdrive"));
    }

    #[test]
    fn user_message_includes_context() {
        let msg = user_message(&request());
        assert!(msg.starts_with("User request: turn my emails"));
        assert!(msg.contains("\"timezone\":\"UTC\""));
    }

    #[test]
    fn openai_body_uses_json_mode() {
        let config = LlmClassifierConfig::openai("k", "gpt-4o-mini");
        let body = openai_request_body(&config, "sys", "usr");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn gemini_body_and_url() {
        let config = LlmClassifierConfig::gemini("secret key", "gemini-2.0-flash");
        let body = gemini_request_body(&config, "sys", "usr");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");

        let url = gemini_url(&config).unwrap();
        assert!(url.starts_with("https://generativelanguage.googleapis.com/v1beta/models/"));
        assert!(url.contains("/gemini-2.0-flash:generateContent?key="));
        assert!(url.ends_with("key=secret+key"));
    }

    #[test]
    fn extracts_text_from_envelopes() {
        let openai = json!({ "choices": [{ "message": { "content": "{}" } }] });
        assert_eq!(extract_openai_text(&openai).unwrap(), "{}");

        let gemini = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"name\":\"x\"}" }] } }]
        });
        assert_eq!(extract_gemini_text(&gemini).unwrap(), "{\"name\":\"x\"}");

        assert!(extract_openai_text(&json!({ "choices": [] })).is_err());
        assert!(extract_gemini_text(&json!({})).is_err());
    }
}
