//! `gmail+gcalendar`: mail out the agenda, or turn emails into events.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, truncate_chars, unknown_operation};
use crate::google::{CalendarApi, GmailApi, NewEvent};

pub const EMAILS_TO_CALENDAR_EVENTS: &str = "emails_to_calendar_events";
pub const CALENDAR_AGENDA_TO_EMAIL: &str = "calendar_agenda_to_email";

const DEFAULT_MAX_EMAILS: u32 = 10;
const DEFAULT_QUERY: &str = "is:unread";
const DEFAULT_DAYS_AHEAD: u32 = 7;
const AGENDA_MAX_EVENTS: u32 = 50;
/// Characters of the email body copied into the event description.
const BODY_EXCERPT: usize = 500;

pub struct GmailCalendarHandler {
    gmail: Arc<dyn GmailApi>,
    calendar: Arc<dyn CalendarApi>,
    operations: Vec<OperationSpec>,
}

impl GmailCalendarHandler {
    pub fn new(
        gmail: Arc<dyn GmailApi>,
        calendar: Arc<dyn CalendarApi>,
    ) -> blimp_kernel::Result<Self> {
        // The agenda predicate is the narrower one: classifier names for this
        // pair ("Gmail to Google Calendar") always contain "mail".
        let operations = vec![
            OperationSpec::new(
                CALENDAR_AGENDA_TO_EMAIL,
                "Email a digest of upcoming calendar events",
                KeywordPredicate::new()
                    .any_of(&["agenda", "digest", "summary"])?
                    .any_of(&["calendar", "event", "schedule"])?,
            ),
            OperationSpec::new(
                EMAILS_TO_CALENDAR_EVENTS,
                "Create a calendar event for each matching email",
                KeywordPredicate::new()
                    .any_of(&["email", "gmail", "mail"])?
                    .any_of(&["calendar", "event"])?,
            ),
        ];
        Ok(Self {
            gmail,
            calendar,
            operations,
        })
    }

    async fn emails_to_events(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let gmail_token = token(credentials, AppId::Gmail)?;
        let calendar_token = token(credentials, AppId::GCalendar)?;
        let p = Params::new(params);
        let max_emails = p.count("max_emails", DEFAULT_MAX_EMAILS)?;
        let query = p.str("query").unwrap_or(DEFAULT_QUERY);

        let ids = self.gmail.list_messages(gmail_token, query, max_emails).await?;
        info!(count = ids.len(), query, "emails fetched");
        if ids.is_empty() {
            return Ok(json!({
                "success": true,
                "events_created": 0,
                "message": "No emails found matching query",
            }));
        }

        let mut events = Vec::new();
        let mut errors = Vec::new();
        for id in ids.iter().take(max_emails as usize) {
            let email = match self.gmail.get_message(gmail_token, id).await {
                Ok(email) => email,
                Err(e) => {
                    warn!(email_id = %id, error = %e, "failed to fetch email");
                    errors.push(format!("Failed to get email {id}: {e}"));
                    continue;
                }
            };

            let start = Utc::now();
            let event = NewEvent {
                summary: format!("📧 {}", email.subject),
                description: format!(
                    "From: {}\n\n{}",
                    email.from,
                    truncate_chars(&email.body, BODY_EXCERPT)
                ),
                start,
                end: start + Duration::hours(1),
            };
            match self.calendar.create_event(calendar_token, &event).await {
                Ok(created) => events.push(created),
                Err(e) => {
                    warn!(email_id = %id, error = %e, "failed to create event");
                    errors.push(format!("Failed to create event for: {}: {e}", email.subject));
                }
            }
        }

        info!(created = events.len(), failed = errors.len(), "emails converted to events");
        Ok(json!({
            "success": true,
            "events_created": events.len(),
            "events": events,
            "errors": errors,
            "message": format!(
                "Successfully created {} calendar events from {} emails",
                events.len(),
                ids.len()
            ),
        }))
    }

    async fn agenda_to_email(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let gmail_token = token(credentials, AppId::Gmail)?;
        let calendar_token = token(credentials, AppId::GCalendar)?;
        let p = Params::new(params);
        let recipient = p.required_str("recipient")?;
        let days_ahead = p.count("days_ahead", DEFAULT_DAYS_AHEAD)?;

        let now = Utc::now();
        let until = now + Duration::days(i64::from(days_ahead));
        let events = self
            .calendar
            .list_events(calendar_token, now, until, AGENDA_MAX_EVENTS)
            .await?;

        let subject = format!("Your agenda for the next {days_ahead} days");
        let body = if events.is_empty() {
            "No events scheduled.".to_string()
        } else {
            events
                .iter()
                .map(|e| format!("• {} {}", e.start, e.summary))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let message_id = self
            .gmail
            .send_message(gmail_token, recipient, &subject, &body)
            .await?;

        info!(events = events.len(), %message_id, "agenda emailed");
        Ok(json!({
            "success": true,
            "events_included": events.len(),
            "message_id": message_id,
            "message": format!("Sent agenda with {} events to {recipient}", events.len()),
        }))
    }
}

#[async_trait]
impl CapabilityHandler for GmailCalendarHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::Gmail, AppId::GCalendar)
    }

    fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    async fn invoke(
        &self,
        operation: &OperationSpec,
        credentials: &CredentialSet,
        parameters: &Value,
    ) -> Result<Value, HandlerError> {
        match operation.name {
            EMAILS_TO_CALENDAR_EVENTS => self.emails_to_events(credentials, parameters).await,
            CALENDAR_AGENDA_TO_EMAIL => self.agenda_to_email(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}
