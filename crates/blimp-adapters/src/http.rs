//! Shared HTTP plumbing for the API clients.
//!
//! One [`HttpClient`] (a `reqwest::Client` with a request timeout) is cloned
//! into every application client. [`HttpClient::send`] turns transport
//! failures, non-success statuses and undecodable bodies into typed
//! [`AdapterError`]s carrying the provider's own message.

use std::time::Duration;

use blimp_kernel::AppId;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AdapterError, Result};

const USER_AGENT: &str = concat!("Blimp/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout for application APIs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn get(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(url).bearer_auth(token)
    }

    pub fn post(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(url).bearer_auth(token)
    }

    /// Send `request` and decode the JSON body.
    pub async fn send(&self, app: AppId, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    app,
                    seconds: self.timeout.as_secs(),
                }
            } else {
                AdapterError::Request {
                    app,
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| AdapterError::Request {
            app,
            reason: format!("failed to read response body: {e}"),
        })?;
        debug!(%app, status = status.as_u16(), bytes = text.len(), "API response");

        if !status.is_success() {
            return Err(provider_error(app, status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| AdapterError::Decode {
            app,
            reason: format!("response is not valid JSON: {e}"),
        })
    }
}

/// Build an [`AdapterError::Api`] from an error response body.
///
/// Understands the Google (`error.message` / `error.status`), GitHub
/// (`message`) and Notion (`message` / `code`) error envelopes, falling back
/// to the raw body.
pub fn provider_error(app: AppId, status: u16, body: &str) -> AdapterError {
    let parsed: Value = serde_json::from_str(body).unwrap_or_else(|_| json!({ "message": body }));

    let message = parsed["error"]["message"]
        .as_str()
        .or_else(|| parsed["message"].as_str())
        .or_else(|| parsed["error"].as_str())
        .filter(|m| !m.is_empty())
        .unwrap_or(body)
        .to_string();
    let code = parsed["error"]["status"]
        .as_str()
        .or_else(|| parsed["code"].as_str())
        .or_else(|| parsed["error"].as_str())
        .map(str::to_owned);

    AdapterError::Api {
        app,
        status,
        code,
        message,
    }
}

/// Join a base URL and a path.
pub(crate) fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Percent-encode one path segment (e.g. a Gmail message id or a repo name).
pub(crate) fn segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(err: AdapterError) -> (u16, Option<String>, String) {
        match err {
            AdapterError::Api {
                status,
                code,
                message,
                ..
            } => (status, code, message),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn google_error_envelope() {
        let body = json!({
            "error": { "code": 401, "message": "Invalid Credentials", "status": "UNAUTHENTICATED" }
        })
        .to_string();
        let (status, code, message) = api(provider_error(AppId::Gmail, 401, &body));
        assert_eq!(status, 401);
        assert_eq!(code.as_deref(), Some("UNAUTHENTICATED"));
        assert_eq!(message, "Invalid Credentials");
    }

    #[test]
    fn notion_and_github_envelopes() {
        let notion = json!({
            "object": "error",
            "status": 404,
            "code": "object_not_found",
            "message": "Could not find database"
        })
        .to_string();
        let (_, code, message) = api(provider_error(AppId::Notion, 404, &notion));
        assert_eq!(code.as_deref(), Some("object_not_found"));
        assert_eq!(message, "Could not find database");

        let github = r#"{"message":"Not Found","documentation_url":"https://docs.github.com"}"#;
        let (_, code, message) = api(provider_error(AppId::GitHub, 404, github));
        assert_eq!(code, None);
        assert_eq!(message, "Not Found");
    }

    #[test]
    fn non_json_body_is_kept_verbatim() {
        let (_, code, message) = api(provider_error(AppId::Slack, 502, "Bad Gateway"));
        assert_eq!(code, None);
        assert_eq!(message, "Bad Gateway");
    }

    #[test]
    fn path_helpers() {
        assert_eq!(join("https://api.github.com/", "/repos"), "https://api.github.com/repos");
        assert_eq!(segment("my repo/x"), "my%20repo%2Fx");
    }
}
