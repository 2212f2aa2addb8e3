//! Slack Web API client.
//!
//! Slack reports most failures with HTTP 200 and `{"ok": false, "error":
//! "<code>"}`; those become [`AdapterError::Api`] with the Slack error code.

use async_trait::async_trait;
use blimp_kernel::AppId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AdapterError, Result};
use crate::http::{HttpClient, join};

const SLACK_BASE_URL: &str = "https://slack.com/api";

/// A posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub channel: String,
    pub ts: String,
    pub text: String,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Post `text` to a channel id or `#name`.
    async fn post_message(&self, token: &str, channel: &str, text: &str) -> Result<SlackMessage>;
}

#[derive(Debug, Clone)]
pub struct SlackHttp {
    http: HttpClient,
    base_url: String,
}

impl SlackHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: SLACK_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SlackApi for SlackHttp {
    async fn post_message(&self, token: &str, channel: &str, text: &str) -> Result<SlackMessage> {
        let url = join(&self.base_url, "/chat.postMessage");
        let request = self
            .http
            .post(&url, token)
            .json(&json!({ "channel": channel, "text": text }));
        let body = self.http.send(AppId::Slack, request).await?;
        parse_post_response(&body, text)
    }
}

pub fn parse_post_response(body: &Value, text: &str) -> Result<SlackMessage> {
    if body["ok"].as_bool() != Some(true) {
        let code = body["error"].as_str().unwrap_or("unknown_error").to_string();
        return Err(AdapterError::Api {
            app: AppId::Slack,
            status: 200,
            message: format!("chat.postMessage failed: {code}"),
            code: Some(code),
        });
    }
    Ok(SlackMessage {
        channel: body["channel"].as_str().unwrap_or_default().to_string(),
        ts: body["ts"].as_str().unwrap_or_default().to_string(),
        text: body["message"]["text"].as_str().unwrap_or(text).to_string(),
    })
}
