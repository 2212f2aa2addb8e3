//! `gcalendar+slack`: post upcoming events to a channel.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, truncate_chars, unknown_operation};
use crate::google::{CalendarApi, CalendarEvent};
use crate::slack::SlackApi;

pub const CALENDAR_EVENTS_TO_SLACK: &str = "calendar_events_to_slack";

const DEFAULT_MAX_EVENTS: u32 = 10;
const DEFAULT_DAYS_AHEAD: u32 = 7;
const DESCRIPTION_EXCERPT: usize = 200;

pub struct CalendarSlackHandler {
    calendar: Arc<dyn CalendarApi>,
    slack: Arc<dyn SlackApi>,
    operations: Vec<OperationSpec>,
}

impl CalendarSlackHandler {
    pub fn new(
        calendar: Arc<dyn CalendarApi>,
        slack: Arc<dyn SlackApi>,
    ) -> blimp_kernel::Result<Self> {
        let operations = vec![OperationSpec::new(
            CALENDAR_EVENTS_TO_SLACK,
            "Post each upcoming calendar event to a Slack channel",
            KeywordPredicate::new()
                .any_of(&["calendar", "event"])?
                .any_of(&["slack"])?,
        )];
        Ok(Self {
            calendar,
            slack,
            operations,
        })
    }

    async fn events_to_slack(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let calendar_token = token(credentials, AppId::GCalendar)?;
        let slack_token = token(credentials, AppId::Slack)?;
        let p = Params::new(params);
        let channel = p.required_str("channel")?;
        let max_events = p.count("max_events", DEFAULT_MAX_EVENTS)?;
        let days_ahead = p.count("days_ahead", DEFAULT_DAYS_AHEAD)?;

        let now = Utc::now();
        let until = now + Duration::days(i64::from(days_ahead));
        let events = self
            .calendar
            .list_events(calendar_token, now, until, max_events)
            .await?;
        info!(count = events.len(), channel, "calendar events fetched");
        if events.is_empty() {
            return Ok(json!({
                "success": true,
                "messages_sent": 0,
                "message": "No calendar events found",
            }));
        }

        let mut messages = Vec::new();
        let mut errors = Vec::new();
        for event in &events {
            match self.slack.post_message(slack_token, channel, &event_message(event)).await {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "failed to post event");
                    errors.push(format!("Failed to send event: {}: {e}", event.summary));
                }
            }
        }

        Ok(json!({
            "success": true,
            "messages_sent": messages.len(),
            "messages": messages,
            "errors": errors,
            "message": format!("Successfully sent {} calendar events to Slack", messages.len()),
        }))
    }
}

/// Slack mrkdwn for one event. All-day events keep their raw dates.
pub fn event_message(event: &CalendarEvent) -> String {
    let parse = |s: &str| DateTime::parse_from_rfc3339(s).ok();
    let (Some(start), Some(end)) = (parse(&event.start), parse(&event.end)) else {
        return format!("📅 *{}*\nStart: {}\nEnd: {}", event.summary, event.start, event.end);
    };

    let mut text = format!(
        "📅 *{}*\n🕐 {} - {}\n",
        event.summary,
        start.format("%B %d, %Y at %I:%M %p"),
        end.format("%I:%M %p")
    );
    if !event.description.is_empty() {
        let excerpt = truncate_chars(&event.description, DESCRIPTION_EXCERPT);
        text.push_str(&format!("📝 {excerpt}\n"));
    }
    if !event.html_link.is_empty() {
        text.push_str(&format!("🔗 <{}|View in Calendar>", event.html_link));
    }
    text
}

#[async_trait]
impl CapabilityHandler for CalendarSlackHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::GCalendar, AppId::Slack)
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
            CALENDAR_EVENTS_TO_SLACK => self.events_to_slack(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: "e1".into(),
            summary: "Planning".into(),
            description: "Quarterly planning".into(),
            start: start.into(),
            end: end.into(),
            html_link: "https://calendar.google.com/e1".into(),
        }
    }

    #[test]
    fn timed_event_message() {
        let text = event_message(&event("2025-06-03T14:00:00Z", "2025-06-03T15:30:00Z"));
        assert_eq!(
            text,
            "📅 *Planning*\n🕐 June 03, 2025 at 02:00 PM - 03:30 PM\n📝 Quarterly planning\n\
             🔗 <https://calendar.google.com/e1|View in Calendar>"
        );
    }

    #[test]
    fn all_day_event_falls_back_to_raw_dates() {
        let text = event_message(&event("2025-06-04", "2025-06-05"));
        assert_eq!(text, "📅 *Planning*\nStart: 2025-06-04\nEnd: 2025-06-05");
    }
}
