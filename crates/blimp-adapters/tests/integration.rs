//! Integration tests for the blimp-adapters crate, driven by in-process fakes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use blimp_adapters::{
    AdapterError, Attachment, CalendarApi, CalendarEvent, Clients, Commit, DriveApi, DriveFile,
    EmailMessage, GitHubApi, GmailApi, NewEvent, NewFile, NotionApi, NotionPage, PullRequest,
    SlackApi, SlackMessage, default_registry,
};
use blimp_kernel::{
    AppCredential, AppId, CapabilityKey, CredentialSet, OAuthToken, WorkflowDefinition,
    WorkflowScope, select_operation,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeGmail {
    messages: Vec<EmailMessage>,
    list_error: Option<u16>,
    broken_ids: Vec<String>,
    broken_attachments: Vec<String>,
    /// Texts sent to this recipient are rejected.
    reject_recipient: Option<&'static str>,
    sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl GmailApi for FakeGmail {
    async fn list_messages(
        &self,
        _: &str,
        _: &str,
        max: u32,
    ) -> blimp_adapters::Result<Vec<String>> {
        if let Some(status) = self.list_error {
            return Err(AdapterError::Api {
                app: AppId::Gmail,
                status,
                code: Some("UNAUTHENTICATED".into()),
                message: "Invalid Credentials".into(),
            });
        }
        Ok(self.messages.iter().take(max as usize).map(|m| m.id.clone()).collect())
    }

    async fn get_message(&self, _: &str, id: &str) -> blimp_adapters::Result<EmailMessage> {
        if self.broken_ids.iter().any(|b| b == id) {
            return Err(AdapterError::Api {
                app: AppId::Gmail,
                status: 404,
                code: None,
                message: "Requested entity was not found.".into(),
            });
        }
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| AdapterError::Internal("no such message".into()))
    }

    async fn get_attachment(
        &self,
        _: &str,
        message_id: &str,
        attachment_id: &str,
    ) -> blimp_adapters::Result<Vec<u8>> {
        if self.broken_attachments.iter().any(|b| b == attachment_id) {
            return Err(AdapterError::Decode {
                app: AppId::Gmail,
                reason: format!("attachment {attachment_id} has no decodable data"),
            });
        }
        Ok(format!("{message_id}/{attachment_id}").into_bytes())
    }

    async fn send_message(
        &self,
        _: &str,
        to: &str,
        subject: &str,
        body: &str,
    ) -> blimp_adapters::Result<String> {
        if self.reject_recipient == Some(to) && subject.contains("REJECT") {
            return Err(AdapterError::Api {
                app: AppId::Gmail,
                status: 400,
                code: Some("INVALID_ARGUMENT".into()),
                message: "Invalid To header".into(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), body.into()));
        Ok("sent-1".into())
    }
}

#[derive(Default)]
struct FakeCalendar {
    events: Vec<CalendarEvent>,
    created: Mutex<Vec<NewEvent>>,
}

#[async_trait]
impl CalendarApi for FakeCalendar {
    async fn list_events(
        &self,
        _: &str,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
        max: u32,
    ) -> blimp_adapters::Result<Vec<CalendarEvent>> {
        Ok(self.events.iter().take(max as usize).cloned().collect())
    }

    async fn create_event(
        &self,
        _: &str,
        event: &NewEvent,
    ) -> blimp_adapters::Result<CalendarEvent> {
        self.created.lock().unwrap().push(event.clone());
        Ok(CalendarEvent {
            id: format!("ev-{}", self.created.lock().unwrap().len()),
            summary: event.summary.clone(),
            description: event.description.clone(),
            start: event.start.to_rfc3339(),
            end: event.end.to_rfc3339(),
            html_link: String::new(),
        })
    }
}

#[derive(Default)]
struct FakeDrive {
    /// Uploads whose name contains this marker are rejected.
    reject: Option<&'static str>,
    folders: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<NewFile>>,
}

#[async_trait]
impl DriveApi for FakeDrive {
    async fn ensure_folder(&self, _: &str, name: &str) -> blimp_adapters::Result<String> {
        self.folders.lock().unwrap().push(name.into());
        Ok("folder-1".into())
    }

    async fn upload_file(&self, _: &str, file: &NewFile) -> blimp_adapters::Result<DriveFile> {
        if self.reject.is_some_and(|marker| file.name.contains(marker)) {
            return Err(AdapterError::Api {
                app: AppId::GDrive,
                status: 403,
                code: Some("PERMISSION_DENIED".into()),
                message: "The user's Drive storage quota has been exceeded.".into(),
            });
        }
        let mut uploaded = self.uploaded.lock().unwrap();
        uploaded.push(file.clone());
        Ok(DriveFile {
            id: format!("file-{}", uploaded.len()),
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            web_view_link: String::new(),
        })
    }
}

#[derive(Default)]
struct FakeSlack {
    /// Texts containing this marker are rejected.
    reject: Option<&'static str>,
    posted: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SlackApi for FakeSlack {
    async fn post_message(
        &self,
        _: &str,
        channel: &str,
        text: &str,
    ) -> blimp_adapters::Result<SlackMessage> {
        if self.reject.is_some_and(|marker| text.contains(marker)) {
            return Err(AdapterError::Api {
                app: AppId::Slack,
                status: 200,
                code: Some("msg_too_long".into()),
                message: "chat.postMessage failed: msg_too_long".into(),
            });
        }
        let mut posted = self.posted.lock().unwrap();
        posted.push((channel.into(), text.into()));
        Ok(SlackMessage {
            channel: channel.into(),
            ts: format!("1717.{:04}", posted.len()),
            text: text.into(),
        })
    }
}

#[derive(Default)]
struct FakeGitHub {
    commits: Vec<Commit>,
    pulls_fail: bool,
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    async fn list_commits(
        &self,
        _: &str,
        _: &str,
        _: &str,
        n: u32,
    ) -> blimp_adapters::Result<Vec<Commit>> {
        Ok(self.commits.iter().take(n as usize).cloned().collect())
    }

    async fn list_pull_requests(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: u32,
    ) -> blimp_adapters::Result<Vec<PullRequest>> {
        if self.pulls_fail {
            return Err(AdapterError::Api {
                app: AppId::GitHub,
                status: 403,
                code: None,
                message: "Resource not accessible by integration".into(),
            });
        }
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeNotion {
    pages: Vec<NotionPage>,
}

#[async_trait]
impl NotionApi for FakeNotion {
    async fn query_database(
        &self,
        _: &str,
        _: &str,
        n: u32,
    ) -> blimp_adapters::Result<Vec<NotionPage>> {
        Ok(self.pages.iter().take(n as usize).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fakes {
    gmail: Arc<FakeGmail>,
    calendar: Arc<FakeCalendar>,
    drive: Arc<FakeDrive>,
    slack: Arc<FakeSlack>,
    github: Arc<FakeGitHub>,
    notion: Arc<FakeNotion>,
}

impl Fakes {
    fn clients(&self) -> Clients {
        Clients {
            gmail: self.gmail.clone(),
            calendar: self.calendar.clone(),
            drive: self.drive.clone(),
            slack: self.slack.clone(),
            github: self.github.clone(),
            notion: self.notion.clone(),
        }
    }
}

fn fakes() -> Fakes {
    Fakes {
        gmail: Arc::new(FakeGmail::default()),
        calendar: Arc::new(FakeCalendar::default()),
        drive: Arc::new(FakeDrive::default()),
        slack: Arc::new(FakeSlack::default()),
        github: Arc::new(FakeGitHub::default()),
        notion: Arc::new(FakeNotion::default()),
    }
}

fn email(id: &str, subject: &str) -> EmailMessage {
    EmailMessage {
        id: id.into(),
        subject: subject.into(),
        from: "ana@example.com".into(),
        date: String::new(),
        body: format!("Details about {subject}"),
        attachments: Vec::new(),
    }
}

fn attachment(id: &str, filename: &str) -> Attachment {
    Attachment {
        attachment_id: id.into(),
        filename: filename.into(),
        mime_type: "application/pdf".into(),
        size: 1024,
    }
}

fn workflow(name: &str, description: &str, apps: [AppId; 2]) -> WorkflowDefinition {
    WorkflowDefinition {
        id: "wf".into(),
        name: name.into(),
        description: description.into(),
        required_apps: CapabilityKey::new(apps).unwrap(),
        category: "custom".into(),
        scope: WorkflowScope::Template,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn credentials(apps: &[AppId]) -> CredentialSet {
    apps.iter()
        .map(|app| match app {
            AppId::Slack => AppCredential::Slack {
                bot_token: "xoxb-test".into(),
            },
            AppId::Notion => AppCredential::Notion {
                integration_token: "secret_test".into(),
            },
            AppId::GitHub => AppCredential::GitHub {
                token: "ghp_test".into(),
            },
            AppId::Gmail => AppCredential::Gmail(OAuthToken::new("ya29.gmail")),
            AppId::GCalendar => AppCredential::GCalendar(OAuthToken::new("ya29.cal")),
            AppId::GDrive => AppCredential::GDrive(OAuthToken::new("ya29.drive")),
            other => panic!("no fixture for {other}"),
        })
        .collect()
}

async fn run(
    fakes: &Fakes,
    wf: &WorkflowDefinition,
    creds: &CredentialSet,
    params: Value,
) -> Result<Value, blimp_kernel::HandlerError> {
    let registry = default_registry(&fakes.clients()).unwrap();
    let handler = registry.lookup(&wf.required_apps).unwrap();
    let op = select_operation(handler.operations(), wf).expect("an operation matches");
    handler.invoke(op, creds, &params).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn default_registry_serves_all_builtin_pairs() {
    let registry = default_registry(&fakes().clients()).unwrap();
    let keys: Vec<String> = registry.keys().iter().map(|k| k.to_string()).collect();
    assert_eq!(
        keys,
        vec![
            "gmail+gcalendar",
            "gmail+gdrive",
            "gmail+notion",
            "gcalendar+slack",
            "slack+notion",
            "slack+github"
        ]
    );
}

#[test]
fn operations_are_selected_by_metadata() {
    let registry = default_registry(&fakes().clients()).unwrap();
    let handler = registry
        .lookup(&CapabilityKey::pair(AppId::Gmail, AppId::GCalendar))
        .unwrap();

    let to_events = workflow(
        "Email to Calendar",
        "Turn unread emails into events",
        [AppId::Gmail, AppId::GCalendar],
    );
    assert_eq!(
        select_operation(handler.operations(), &to_events).unwrap().name,
        "emails_to_calendar_events"
    );

    let digest = workflow(
        "Weekly agenda",
        "Send me my calendar schedule",
        [AppId::Gmail, AppId::GCalendar],
    );
    assert_eq!(
        select_operation(handler.operations(), &digest).unwrap().name,
        "calendar_agenda_to_email"
    );

    let neither = workflow("Inbox zero", "Archive old threads", [AppId::Gmail, AppId::GCalendar]);
    assert!(select_operation(handler.operations(), &neither).is_none());
}

#[test]
fn generated_names_still_reach_the_agenda_operation() {
    let registry = default_registry(&fakes().clients()).unwrap();
    let handler = registry
        .lookup(&CapabilityKey::pair(AppId::Gmail, AppId::GCalendar))
        .unwrap();
    let selected = |name: &str, description: &str| {
        let wf = workflow(name, description, [AppId::Gmail, AppId::GCalendar]);
        select_operation(handler.operations(), &wf).unwrap().name
    };

    assert_eq!(
        selected(
            "Gmail to Google Calendar",
            "Email me a summary of my calendar agenda for the week",
        ),
        "calendar_agenda_to_email"
    );
    assert_eq!(
        selected("Google Calendar to Gmail", "Mail me a digest of upcoming events"),
        "calendar_agenda_to_email"
    );
    assert_eq!(
        selected("Gmail to Google Calendar", "Send my Gmail emails to Google Calendar"),
        "emails_to_calendar_events"
    );
}

#[tokio::test]
async fn emails_become_events_and_per_item_failures_are_collected() {
    let mut f = fakes();
    f.gmail = Arc::new(FakeGmail {
        messages: vec![email("m1", "Lunch"), email("m2", "Offsite")],
        broken_ids: vec!["m2".into()],
        ..FakeGmail::default()
    });
    let wf = workflow(
        "Email to Calendar",
        "Create calendar events from unread emails",
        [AppId::Gmail, AppId::GCalendar],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::Gmail, AppId::GCalendar]),
        json!({ "max_emails": 5 }),
    )
        .await
        .unwrap();

    assert_eq!(result["success"], true);
    assert_eq!(result["events_created"], 1);
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    assert_eq!(result["message"], "Successfully created 1 calendar events from 2 emails");

    let created = f.calendar.created.lock().unwrap();
    assert_eq!(created[0].summary, "📧 Lunch");
    assert_eq!(created[0].description, "From: ana@example.com\n\nDetails about Lunch");
    assert_eq!((created[0].end - created[0].start).num_minutes(), 60);
}

#[tokio::test]
async fn no_matching_emails_is_a_success() {
    let f = fakes();
    let wf = workflow("Email to Calendar", "", [AppId::Gmail, AppId::GCalendar]);
    let result = run(&f, &wf, &credentials(&[AppId::Gmail, AppId::GCalendar]), Value::Null)
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({ "success": true, "events_created": 0, "message": "No emails found matching query" })
    );
}

#[tokio::test]
async fn failed_initial_fetch_fails_with_provider_detail() {
    let mut f = fakes();
    f.gmail = Arc::new(FakeGmail {
        list_error: Some(401),
        ..FakeGmail::default()
    });
    let wf = workflow("Email to Calendar", "", [AppId::Gmail, AppId::GCalendar]);
    let err = run(&f, &wf, &credentials(&[AppId::Gmail, AppId::GCalendar]), json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.app, Some(AppId::Gmail));
    assert_eq!(err.status, Some(401));
    assert_eq!(err.code.as_deref(), Some("UNAUTHENTICATED"));
    assert_eq!(err.message, "Invalid Credentials");
}

#[tokio::test]
async fn handler_reports_missing_credential() {
    let f = fakes();
    let wf = workflow("Email to Calendar", "", [AppId::Gmail, AppId::GCalendar]);
    let err = run(&f, &wf, &credentials(&[AppId::Gmail]), json!({})).await.unwrap_err();
    assert_eq!(err.app, Some(AppId::GCalendar));
    assert_eq!(err.code.as_deref(), Some("missing_credential"));
}

#[tokio::test]
async fn agenda_is_mailed_to_recipient() {
    let mut f = fakes();
    f.calendar = Arc::new(FakeCalendar {
        events: vec![CalendarEvent {
            id: "e1".into(),
            summary: "Standup".into(),
            start: "2025-06-03T09:00:00Z".into(),
            end: "2025-06-03T09:15:00Z".into(),
            ..CalendarEvent::default()
        }],
        ..FakeCalendar::default()
    });
    let wf = workflow(
        "Calendar digest",
        "Weekly agenda of my calendar",
        [AppId::Gmail, AppId::GCalendar],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::Gmail, AppId::GCalendar]),
        json!({ "recipient": "me@example.com", "days_ahead": 3 }),
    )
    .await
    .unwrap();
    assert_eq!(result["events_included"], 1);
    assert_eq!(result["message_id"], "sent-1");

    let sent = f.gmail.sent.lock().unwrap();
    assert_eq!(sent[0].0, "me@example.com");
    assert_eq!(sent[0].1, "Your agenda for the next 3 days");
    assert_eq!(sent[0].2, "• 2025-06-03T09:00:00Z Standup");
}

#[tokio::test]
async fn calendar_to_slack_requires_channel() {
    let f = fakes();
    let wf = workflow(
        "Calendar to Slack",
        "Post events to Slack",
        [AppId::GCalendar, AppId::Slack],
    );
    let err = run(&f, &wf, &credentials(&[AppId::GCalendar, AppId::Slack]), json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code.as_deref(), Some("invalid_params"));
    assert!(err.message.contains("channel"));
}

#[tokio::test]
async fn notion_pages_are_posted_and_rejections_collected() {
    let mut f = fakes();
    f.notion = Arc::new(FakeNotion {
        pages: vec![
            NotionPage {
                id: "p1".into(),
                title: "Roadmap".into(),
                url: "https://notion.so/p1".into(),
            },
            NotionPage {
                id: "p2".into(),
                title: "REJECT me".into(),
                url: "https://notion.so/p2".into(),
            },
        ],
    });
    f.slack = Arc::new(FakeSlack {
        reject: Some("REJECT"),
        ..FakeSlack::default()
    });
    let wf = workflow(
        "Notion to Slack",
        "Share notion pages in slack",
        [AppId::Notion, AppId::Slack],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::Notion, AppId::Slack]),
        json!({ "database_id": "db1", "channel": "#product" }),
    )
    .await
    .unwrap();
    assert_eq!(result["messages_sent"], 1);
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    assert_eq!(
        f.slack.posted.lock().unwrap()[0],
        ("#product".to_string(), "📄 *Roadmap*\nhttps://notion.so/p1".to_string())
    );
}

#[tokio::test]
async fn github_update_survives_pull_request_failure() {
    let mut f = fakes();
    f.github = Arc::new(FakeGitHub {
        commits: vec![Commit {
            sha: "abcdef123456".into(),
            title: "Bump deps".into(),
            author: "octocat".into(),
            url: String::new(),
        }],
        pulls_fail: true,
    });
    let wf = workflow(
        "GitHub to Slack",
        "Post repo commits to slack",
        [AppId::GitHub, AppId::Slack],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::GitHub, AppId::Slack]),
        json!({ "repo": "octo/hello", "channel": "C42" }),
    )
    .await
    .unwrap();
    assert_eq!(result["commits"], 1);
    assert_eq!(result["pull_requests"], 0);
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);

    let posted = f.slack.posted.lock().unwrap();
    assert!(posted[0].1.contains("GitHub Repository Update: octo/hello"));
    assert!(posted[0].1.contains("Bump deps (abcdef1) by octocat"));
}

#[tokio::test]
async fn attachments_are_saved_to_drive_and_failures_collected() {
    let mut f = fakes();
    let mut invoice = email("m1", "Invoice");
    invoice.attachments = vec![attachment("a1", "invoice.pdf"), attachment("a2", "corrupt.pdf")];
    let mut receipt = email("m2", "Receipt");
    receipt.attachments = vec![attachment("a3", "QUOTA receipt.pdf")];
    f.gmail = Arc::new(FakeGmail {
        messages: vec![invoice, receipt, email("m3", "Missing")],
        broken_ids: vec!["m3".into()],
        broken_attachments: vec!["a2".into()],
        ..FakeGmail::default()
    });
    f.drive = Arc::new(FakeDrive {
        reject: Some("QUOTA"),
        ..FakeDrive::default()
    });
    let wf = workflow(
        "Gmail to Google Drive",
        "Save my email attachments to Drive",
        [AppId::Gmail, AppId::GDrive],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::Gmail, AppId::GDrive]),
        json!({ "folder_name": "Receipts" }),
    )
    .await
    .unwrap();

    assert_eq!(result["files_saved"], 1);
    assert_eq!(result["files"][0]["name"], "invoice.pdf");
    assert_eq!(result["folder_id"], "folder-1");
    assert_eq!(result["errors"].as_array().unwrap().len(), 3);
    assert_eq!(result["message"], "Saved 1 attachments from 3 emails to Receipts");

    assert_eq!(*f.drive.folders.lock().unwrap(), vec!["Receipts".to_string()]);
    let uploaded = f.drive.uploaded.lock().unwrap();
    assert_eq!(uploaded[0].parent_id.as_deref(), Some("folder-1"));
    assert_eq!(uploaded[0].mime_type, "application/pdf");
    assert_eq!(uploaded[0].content, b"m1/a1");
}

#[tokio::test]
async fn no_emails_with_attachments_creates_no_folder() {
    let f = fakes();
    let wf = workflow("Gmail to Google Drive", "", [AppId::Gmail, AppId::GDrive]);
    let result = run(&f, &wf, &credentials(&[AppId::Gmail, AppId::GDrive]), json!({}))
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({ "success": true, "files_saved": 0, "message": "No emails with attachments found" })
    );
    assert!(f.drive.folders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn notion_pages_are_emailed_and_rejections_collected() {
    let mut f = fakes();
    f.notion = Arc::new(FakeNotion {
        pages: vec![
            NotionPage {
                id: "p1".into(),
                title: "Roadmap".into(),
                url: "https://notion.so/p1".into(),
            },
            NotionPage {
                id: "p2".into(),
                title: "REJECT me".into(),
                url: "https://notion.so/p2".into(),
            },
        ],
    });
    f.gmail = Arc::new(FakeGmail {
        reject_recipient: Some("me@example.com"),
        ..FakeGmail::default()
    });
    let wf = workflow(
        "Notion to Gmail",
        "Email me new Notion pages",
        [AppId::Notion, AppId::Gmail],
    );

    let result = run(
        &f,
        &wf,
        &credentials(&[AppId::Notion, AppId::Gmail]),
        json!({ "database_id": "db1", "recipient": "me@example.com" }),
    )
    .await
    .unwrap();
    assert_eq!(result["emails_sent"], 1);
    assert_eq!(result["message_ids"], json!(["sent-1"]));
    assert_eq!(result["errors"].as_array().unwrap().len(), 1);

    let sent = f.gmail.sent.lock().unwrap();
    assert_eq!(sent[0].1, "Notion Page: Roadmap");
    assert_eq!(sent[0].2, "Here's your Notion page:\n\nRoadmap\n\nhttps://notion.so/p1");
}

#[tokio::test]
async fn notion_to_gmail_requires_recipient() {
    let f = fakes();
    let wf = workflow("Notion to Gmail", "", [AppId::Notion, AppId::Gmail]);
    let err = run(
        &f,
        &wf,
        &credentials(&[AppId::Notion, AppId::Gmail]),
        json!({ "database_id": "db1" }),
    )
        .await
        .unwrap_err();
    assert_eq!(err.code.as_deref(), Some("invalid_params"));
    assert!(err.message.contains("recipient"));
}
