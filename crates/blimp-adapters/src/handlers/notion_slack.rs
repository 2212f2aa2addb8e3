//! `notion+slack`: post database pages to a channel.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, unknown_operation};
use crate::notion::NotionApi;
use crate::slack::SlackApi;

pub const NOTION_PAGES_TO_SLACK: &str = "notion_pages_to_slack";

const DEFAULT_MAX_PAGES: u32 = 10;

pub struct NotionSlackHandler {
    notion: Arc<dyn NotionApi>,
    slack: Arc<dyn SlackApi>,
    operations: Vec<OperationSpec>,
}

impl NotionSlackHandler {
    pub fn new(notion: Arc<dyn NotionApi>, slack: Arc<dyn SlackApi>) -> blimp_kernel::Result<Self> {
        let operations = vec![OperationSpec::new(
            NOTION_PAGES_TO_SLACK,
            "Post each page of a Notion database to a Slack channel",
            KeywordPredicate::new()
                .any_of(&["notion", "page"])?
                .any_of(&["slack"])?,
        )];
        Ok(Self {
            notion,
            slack,
            operations,
        })
    }

    async fn pages_to_slack(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let notion_token = token(credentials, AppId::Notion)?;
        let slack_token = token(credentials, AppId::Slack)?;
        let p = Params::new(params);
        let database_id = p.required_str("database_id")?;
        let channel = p.required_str("channel")?;
        let max_pages = p.count("max_pages", DEFAULT_MAX_PAGES)?;

        let pages = self
            .notion
            .query_database(notion_token, database_id, max_pages)
            .await?;
        info!(count = pages.len(), database_id, "notion pages fetched");
        if pages.is_empty() {
            return Ok(json!({
                "success": true,
                "messages_sent": 0,
                "message": "No pages found in database",
            }));
        }

        let mut messages = Vec::new();
        let mut errors = Vec::new();
        for page in &pages {
            let text = format!("📄 *{}*\n{}", page.title, page.url);
            match self.slack.post_message(slack_token, channel, &text).await {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(page_id = %page.id, error = %e, "failed to post page");
                    errors.push(format!("Failed to send page: {}: {e}", page.title));
                }
            }
        }

        Ok(json!({
            "success": true,
            "messages_sent": messages.len(),
            "messages": messages,
            "errors": errors,
            "message": format!("Successfully sent {} Notion pages to Slack", messages.len()),
        }))
    }
}

#[async_trait]
impl CapabilityHandler for NotionSlackHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::Notion, AppId::Slack)
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
            NOTION_PAGES_TO_SLACK => self.pages_to_slack(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}
