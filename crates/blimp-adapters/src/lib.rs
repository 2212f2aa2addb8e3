//! Application clients and capability handlers for Blimp.
//!
//! Each supported application has a small async client trait ([`GmailApi`],
//! [`CalendarApi`], [`DriveApi`], [`SlackApi`], [`GitHubApi`], [`NotionApi`]) with a
//! `reqwest` implementation. The [`handlers`] compose two clients into one
//! [`CapabilityHandler`](blimp_kernel::CapabilityHandler) per capability key,
//! and [`default_registry`] registers all of them.

pub mod drive;
pub mod error;
pub mod github;
pub mod google;
pub mod handlers;
pub mod http;
pub mod notion;
pub mod registry;
pub mod slack;

pub use drive::{DriveApi, DriveFile, DriveHttp, NewFile};
pub use error::{AdapterError, Result};
pub use github::{Commit, GitHubApi, GitHubHttp, PullRequest};
pub use google::{
    Attachment, CalendarApi, CalendarEvent, CalendarHttp, EmailMessage, GmailApi, GmailHttp,
    NewEvent,
};
pub use handlers::{
    CalendarSlackHandler, GitHubSlackHandler, GmailCalendarHandler, GmailDriveHandler,
    NotionGmailHandler, NotionSlackHandler,
};
pub use http::{DEFAULT_TIMEOUT, HttpClient};
pub use notion::{NotionApi, NotionHttp, NotionPage};
pub use registry::{Clients, default_registry};
pub use slack::{SlackApi, SlackHttp, SlackMessage};
