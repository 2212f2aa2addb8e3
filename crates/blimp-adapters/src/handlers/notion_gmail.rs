//! `gmail+notion`: mail each page of a Notion database.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, unknown_operation};
use crate::google::GmailApi;
use crate::notion::NotionApi;

pub const NOTION_PAGES_TO_EMAIL: &str = "notion_pages_to_email";

const DEFAULT_MAX_PAGES: u32 = 10;

pub struct NotionGmailHandler {
    notion: Arc<dyn NotionApi>,
    gmail: Arc<dyn GmailApi>,
    operations: Vec<OperationSpec>,
}

impl NotionGmailHandler {
    pub fn new(
        notion: Arc<dyn NotionApi>,
        gmail: Arc<dyn GmailApi>,
    ) -> blimp_kernel::Result<Self> {
        let operations = vec![OperationSpec::new(
            NOTION_PAGES_TO_EMAIL,
            "Send each page of a Notion database as an email",
            KeywordPredicate::new()
                .any_of(&["notion", "page"])?
                .any_of(&["email", "gmail", "mail"])?,
        )];
        Ok(Self {
            notion,
            gmail,
            operations,
        })
    }

    async fn pages_to_email(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let notion_token = token(credentials, AppId::Notion)?;
        let gmail_token = token(credentials, AppId::Gmail)?;
        let p = Params::new(params);
        let database_id = p.required_str("database_id")?;
        let recipient = p.required_str("recipient")?;
        let max_pages = p.count("max_pages", DEFAULT_MAX_PAGES)?;

        let pages = self
            .notion
            .query_database(notion_token, database_id, max_pages)
            .await?;
        info!(count = pages.len(), database_id, "notion pages fetched");
        if pages.is_empty() {
            return Ok(json!({
                "success": true,
                "emails_sent": 0,
                "message": "No pages found in database",
            }));
        }

        let mut message_ids = Vec::new();
        let mut errors = Vec::new();
        for page in &pages {
            let subject = format!("Notion Page: {}", page.title);
            let body = format!("Here's your Notion page:\n\n{}\n\n{}", page.title, page.url);
            match self.gmail.send_message(gmail_token, recipient, &subject, &body).await {
                Ok(id) => message_ids.push(id),
                Err(e) => {
                    warn!(page_id = %page.id, error = %e, "failed to email page");
                    errors.push(format!("Failed to send email for page: {}: {e}", page.title));
                }
            }
        }

        Ok(json!({
            "success": true,
            "emails_sent": message_ids.len(),
            "message_ids": message_ids,
            "errors": errors,
            "message": format!(
                "Successfully sent {} Notion pages as emails",
                message_ids.len()
            ),
        }))
    }
}

#[async_trait]
impl CapabilityHandler for NotionGmailHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::Gmail, AppId::Notion)
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
            NOTION_PAGES_TO_EMAIL => self.pages_to_email(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}
