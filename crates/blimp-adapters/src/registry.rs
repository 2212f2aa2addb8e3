//! Wiring: API clients in, frozen [`CapabilityRegistry`] out.

use std::sync::Arc;
use std::time::Duration;

use blimp_kernel::CapabilityRegistry;

use crate::drive::{DriveApi, DriveHttp};
use crate::error::Result;
use crate::github::{GitHubApi, GitHubHttp};
use crate::google::{CalendarApi, CalendarHttp, GmailApi, GmailHttp};
use crate::handlers::{
    CalendarSlackHandler, GitHubSlackHandler, GmailCalendarHandler, GmailDriveHandler,
    NotionGmailHandler, NotionSlackHandler,
};
use crate::http::HttpClient;
use crate::notion::{NotionApi, NotionHttp};
use crate::slack::{SlackApi, SlackHttp};

/// One client per application API.
#[derive(Clone)]
pub struct Clients {
    pub gmail: Arc<dyn GmailApi>,
    pub calendar: Arc<dyn CalendarApi>,
    pub drive: Arc<dyn DriveApi>,
    pub slack: Arc<dyn SlackApi>,
    pub github: Arc<dyn GitHubApi>,
    pub notion: Arc<dyn NotionApi>,
}

impl Clients {
    /// REST clients sharing one connection pool, each request bounded by
    /// `timeout`.
    pub fn http(timeout: Duration) -> Result<Self> {
        let http = HttpClient::new(timeout)?;
        Ok(Self {
            gmail: Arc::new(GmailHttp::new(http.clone())),
            calendar: Arc::new(CalendarHttp::new(http.clone())),
            drive: Arc::new(DriveHttp::new(http.clone())),
            slack: Arc::new(SlackHttp::new(http.clone())),
            github: Arc::new(GitHubHttp::new(http.clone())),
            notion: Arc::new(NotionHttp::new(http)),
        })
    }
}

/// Registry with every built-in handler.
pub fn default_registry(clients: &Clients) -> blimp_kernel::Result<CapabilityRegistry> {
    Ok(CapabilityRegistry::builder()
        .register_handler(Arc::new(GmailCalendarHandler::new(
            clients.gmail.clone(),
            clients.calendar.clone(),
        )?))?
        .register_handler(Arc::new(GmailDriveHandler::new(
            clients.gmail.clone(),
            clients.drive.clone(),
        )?))?
        .register_handler(Arc::new(NotionGmailHandler::new(
            clients.notion.clone(),
            clients.gmail.clone(),
        )?))?
        .register_handler(Arc::new(CalendarSlackHandler::new(
            clients.calendar.clone(),
            clients.slack.clone(),
        )?))?
        .register_handler(Arc::new(GitHubSlackHandler::new(
            clients.github.clone(),
            clients.slack.clone(),
        )?))?
        .register_handler(Arc::new(NotionSlackHandler::new(
            clients.notion.clone(),
            clients.slack.clone(),
        )?))?
        .build())
}
