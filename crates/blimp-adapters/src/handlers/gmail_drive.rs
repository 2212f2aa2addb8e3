//! `gmail+gdrive`: save email attachments into a Drive folder.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, unknown_operation};
use crate::drive::{DriveApi, DriveFile, NewFile};
use crate::google::{Attachment, GmailApi};

pub const SAVE_ATTACHMENTS_TO_DRIVE: &str = "save_attachments_to_drive";

const DEFAULT_MAX_EMAILS: u32 = 10;
const DEFAULT_QUERY: &str = "has:attachment";
const DEFAULT_FOLDER: &str = "Email Attachments";

pub struct GmailDriveHandler {
    gmail: Arc<dyn GmailApi>,
    drive: Arc<dyn DriveApi>,
    operations: Vec<OperationSpec>,
}

impl GmailDriveHandler {
    pub fn new(
        gmail: Arc<dyn GmailApi>,
        drive: Arc<dyn DriveApi>,
    ) -> blimp_kernel::Result<Self> {
        let operations = vec![OperationSpec::new(
            SAVE_ATTACHMENTS_TO_DRIVE,
            "Upload the attachments of matching emails to a Drive folder",
            KeywordPredicate::new()
                .any_of(&["attachment", "email", "gmail", "mail"])?
                .any_of(&["drive", "save", "upload", "folder"])?,
        )];
        Ok(Self {
            gmail,
            drive,
            operations,
        })
    }

    async fn save_attachments(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let gmail_token = token(credentials, AppId::Gmail)?;
        let drive_token = token(credentials, AppId::GDrive)?;
        let p = Params::new(params);
        let max_emails = p.count("max_emails", DEFAULT_MAX_EMAILS)?;
        let query = p.str("query").unwrap_or(DEFAULT_QUERY);
        let folder_name = p.str("folder_name").unwrap_or(DEFAULT_FOLDER);

        let ids = self.gmail.list_messages(gmail_token, query, max_emails).await?;
        info!(count = ids.len(), query, "emails fetched");
        if ids.is_empty() {
            return Ok(json!({
                "success": true,
                "files_saved": 0,
                "message": "No emails with attachments found",
            }));
        }

        let folder_id = self.drive.ensure_folder(drive_token, folder_name).await?;

        let mut files = Vec::new();
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
            for attachment in &email.attachments {
                let saved = self
                    .save_one(gmail_token, drive_token, &folder_id, &email.id, attachment)
                    .await;
                match saved {
                    Ok(file) => files.push(file),
                    Err(e) => {
                        warn!(
                            email_id = %id,
                            file = %attachment.filename,
                            error = %e,
                            "failed to save attachment"
                        );
                        errors.push(format!("Failed to save {}: {e}", attachment.filename));
                    }
                }
            }
        }

        info!(saved = files.len(), failed = errors.len(), "attachments saved");
        Ok(json!({
            "success": true,
            "files_saved": files.len(),
            "files": files,
            "folder_id": folder_id,
            "errors": errors,
            "message": format!(
                "Saved {} attachments from {} emails to {folder_name}",
                files.len(),
                ids.len()
            ),
        }))
    }

    async fn save_one(
        &self,
        gmail_token: &str,
        drive_token: &str,
        folder_id: &str,
        message_id: &str,
        attachment: &Attachment,
    ) -> crate::Result<DriveFile> {
        let content = self
            .gmail
            .get_attachment(gmail_token, message_id, &attachment.attachment_id)
            .await?;
        let file = NewFile {
            name: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            parent_id: Some(folder_id.to_string()),
            content,
        };
        self.drive.upload_file(drive_token, &file).await
    }
}

#[async_trait]
impl CapabilityHandler for GmailDriveHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::Gmail, AppId::GDrive)
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
            SAVE_ATTACHMENTS_TO_DRIVE => self.save_attachments(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}
