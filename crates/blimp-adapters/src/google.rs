//! Gmail and Google Calendar clients.
//!
//! Both APIs take the user's OAuth access token as a bearer token. The
//! traits are the seam handlers depend on; [`GmailHttp`] and
//! [`CalendarHttp`] are the REST implementations. Drive lives in
//! [`drive`](crate::drive).

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use blimp_kernel::AppId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AdapterError, Result};
use crate::http::{HttpClient, join, segment};

const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The parts of a Gmail message the handlers use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    /// Plain-text body, or the snippet when there is none.
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A file attached to a message. The content is fetched separately with
/// [`GmailApi::get_attachment`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub attachment_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
}

/// A Google Calendar event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    /// `dateTime` for timed events, `date` for all-day events.
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub html_link: String,
}

/// Input for [`CalendarApi::create_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait GmailApi: Send + Sync {
    /// Ids of messages matching a Gmail search query, newest first.
    async fn list_messages(
        &self,
        token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>>;

    async fn get_message(&self, token: &str, id: &str) -> Result<EmailMessage>;

    /// Raw bytes of one attachment of `message_id`.
    async fn get_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>>;

    /// Send a plain-text email. Returns the new message id.
    async fn send_message(
        &self,
        token: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String>;
}

#[async_trait]
pub trait CalendarApi: Send + Sync {
    /// Events on the primary calendar between the two instants, by start time.
    async fn list_events(
        &self,
        token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>>;

    async fn create_event(&self, token: &str, event: &NewEvent) -> Result<CalendarEvent>;
}

// ---------------------------------------------------------------------------
// Gmail over REST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GmailHttp {
    http: HttpClient,
    base_url: String,
}

impl GmailHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: GMAIL_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GmailApi for GmailHttp {
    async fn list_messages(
        &self,
        token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let url = join(&self.base_url, "/users/me/messages");
        let request = self
            .http
            .get(&url, token)
            .query(&[("q", query.to_string()), ("maxResults", max_results.to_string())]);
        let body = self.http.send(AppId::Gmail, request).await?;
        Ok(body["messages"]
            .as_array()
            .map(|msgs| {
                msgs.iter()
                    .filter_map(|m| m["id"].as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<EmailMessage> {
        let url = join(&self.base_url, &format!("/users/me/messages/{}", segment(id)));
        let request = self.http.get(&url, token).query(&[("format", "full")]);
        let body = self.http.send(AppId::Gmail, request).await?;
        parse_message(&body)
    }

    async fn get_attachment(
        &self,
        token: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>> {
        let path = format!(
            "/users/me/messages/{}/attachments/{}",
            segment(message_id),
            segment(attachment_id)
        );
        let request = self.http.get(&join(&self.base_url, &path), token);
        let body = self.http.send(AppId::Gmail, request).await?;
        body["data"]
            .as_str()
            .and_then(decode_base64url)
            .ok_or_else(|| AdapterError::Decode {
                app: AppId::Gmail,
                reason: format!("attachment {attachment_id} has no decodable data"),
            })
    }

    async fn send_message(
        &self,
        token: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String> {
        let url = join(&self.base_url, "/users/me/messages/send");
        let raw = URL_SAFE.encode(rfc822(to, subject, body));
        let request = self.http.post(&url, token).json(&json!({ "raw": raw }));
        let sent = self.http.send(AppId::Gmail, request).await?;
        sent["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| AdapterError::Decode {
                app: AppId::Gmail,
                reason: "send response has no message id".into(),
            })
    }
}

/// Extract headers and the plain-text body from a `format=full` message.
pub fn parse_message(v: &Value) -> Result<EmailMessage> {
    let id = v["id"].as_str().ok_or_else(|| AdapterError::Decode {
        app: AppId::Gmail,
        reason: "message has no id".into(),
    })?;

    let header = |name: &str| -> String {
        v["payload"]["headers"]
            .as_array()
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            })
            .and_then(|h| h["value"].as_str())
            .unwrap_or_default()
            .to_string()
    };

    let body = plain_text_body(&v["payload"])
        .unwrap_or_else(|| v["snippet"].as_str().unwrap_or_default().to_string());

    let mut attachments = Vec::new();
    collect_attachments(&v["payload"], &mut attachments);

    Ok(EmailMessage {
        id: id.to_string(),
        subject: header("Subject"),
        from: header("From"),
        date: header("Date"),
        body,
        attachments,
    })
}

/// Parts with a filename and an `attachmentId`, depth first.
fn collect_attachments(part: &Value, out: &mut Vec<Attachment>) {
    let filename = part["filename"].as_str().filter(|f| !f.is_empty());
    let attachment_id = part["body"]["attachmentId"].as_str();
    if let (Some(filename), Some(attachment_id)) = (filename, attachment_id) {
        out.push(Attachment {
            attachment_id: attachment_id.to_string(),
            filename: filename.to_string(),
            mime_type: part["mimeType"]
                .as_str()
                .unwrap_or("application/octet-stream")
                .to_string(),
            size: part["body"]["size"].as_u64().unwrap_or(0),
        });
    }
    for child in part["parts"].as_array().into_iter().flatten() {
        collect_attachments(child, out);
    }
}

fn plain_text_body(payload: &Value) -> Option<String> {
    if payload["mimeType"].as_str() == Some("text/plain")
        && let Some(text) = decode_body(&payload["body"]["data"])
    {
        return Some(text);
    }
    payload["parts"]
        .as_array()?
        .iter()
        .find_map(plain_text_body)
}

fn decode_body(data: &Value) -> Option<String> {
    let bytes = decode_base64url(data.as_str().filter(|d| !d.is_empty())?)?;
    String::from_utf8(bytes).ok()
}

/// Gmail sends base64url with or without padding.
fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()
}

fn rfc822(to: &str, subject: &str, body: &str) -> String {
    format!(
        "To: {to}\r\nSubject: {subject}\r\n\
         Content-Type: text/plain; charset=\"UTF-8\"\r\nMIME-Version: 1.0\r\n\r\n{body}"
    )
}

// ---------------------------------------------------------------------------
// Calendar over REST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CalendarHttp {
    http: HttpClient,
    base_url: String,
}

impl CalendarHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: CALENDAR_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CalendarApi for CalendarHttp {
    async fn list_events(
        &self,
        token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<CalendarEvent>> {
        let url = join(&self.base_url, "/calendars/primary/events");
        let request = self.http.get(&url, token).query(&[
            ("timeMin", time_min.to_rfc3339()),
            ("timeMax", time_max.to_rfc3339()),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ]);
        let body = self.http.send(AppId::GCalendar, request).await?;
        Ok(body["items"]
            .as_array()
            .map(|items| items.iter().map(parse_event).collect())
            .unwrap_or_default())
    }

    async fn create_event(&self, token: &str, event: &NewEvent) -> Result<CalendarEvent> {
        let url = join(&self.base_url, "/calendars/primary/events");
        let payload = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": "UTC" },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": "UTC" },
        });
        let request = self.http.post(&url, token).json(&payload);
        let body = self.http.send(AppId::GCalendar, request).await?;
        Ok(parse_event(&body))
    }
}

/// Map an API event resource, tolerating missing optional fields.
pub fn parse_event(v: &Value) -> CalendarEvent {
    let when = |field: &str| {
        v[field]["dateTime"]
            .as_str()
            .or_else(|| v[field]["date"].as_str())
            .unwrap_or_default()
            .to_string()
    };
    CalendarEvent {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        summary: v["summary"].as_str().unwrap_or("No Title").to_string(),
        description: v["description"].as_str().unwrap_or_default().to_string(),
        start: when("start"),
        end: when("end"),
        html_link: v["htmlLink"].as_str().unwrap_or_default().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
