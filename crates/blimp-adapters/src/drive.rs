//! Google Drive client.
//!
//! Uploads use the `multipart/related` upload endpoint so the file's
//! metadata and content go up in a single request.

use async_trait::async_trait;
use blimp_kernel::AppId;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AdapterError, Result};
use crate::http::{HttpClient, join};

const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,webViewLink";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub web_view_link: String,
}

/// Input for [`DriveApi::upload_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    /// Folder to create the file in; My Drive root when `None`.
    pub parent_id: Option<String>,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DriveApi: Send + Sync {
    /// Id of the folder called `name` in My Drive, created when absent.
    async fn ensure_folder(&self, token: &str, name: &str) -> Result<String>;

    async fn upload_file(&self, token: &str, file: &NewFile) -> Result<DriveFile>;
}

#[derive(Debug, Clone)]
pub struct DriveHttp {
    http: HttpClient,
    base_url: String,
    upload_url: String,
}

impl DriveHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DRIVE_BASE_URL.to_string(),
            upload_url: DRIVE_UPLOAD_URL.to_string(),
        }
    }

    /// Point both the metadata and the upload endpoints at `base_url`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.upload_url = base_url.clone();
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl DriveApi for DriveHttp {
    async fn ensure_folder(&self, token: &str, name: &str) -> Result<String> {
        let url = join(&self.base_url, "/files");
        let request = self.http.get(&url, token).query(&[
            ("q", folder_query(name)),
            ("fields", "files(id,name)".to_string()),
            ("pageSize", "1".to_string()),
        ]);
        let found = self.http.send(AppId::GDrive, request).await?;
        if let Some(id) = found["files"][0]["id"].as_str() {
            return Ok(id.to_string());
        }

        let request = self
            .http
            .post(&url, token)
            .query(&[("fields", "id")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }));
        let created = self.http.send(AppId::GDrive, request).await?;
        created["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| AdapterError::Decode {
                app: AppId::GDrive,
                reason: "folder response has no id".into(),
            })
    }

    async fn upload_file(&self, token: &str, file: &NewFile) -> Result<DriveFile> {
        let url = join(&self.upload_url, "/files");
        let boundary = format!("blimp-{}", uuid::Uuid::now_v7().simple());
        let request = self
            .http
            .post(&url, token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(multipart_related(&boundary, file));
        let body = self.http.send(AppId::GDrive, request).await?;
        parse_file(&body)
    }
}

/// Drive search expression matching a live folder named `name`.
fn folder_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{FOLDER_MIME_TYPE}' and trashed = false")
}

/// Metadata part followed by the content part.
fn multipart_related(boundary: &str, file: &NewFile) -> Vec<u8> {
    let metadata = match &file.parent_id {
        Some(parent) => json!({ "name": file.name, "parents": [parent] }),
        None => json!({ "name": file.name }),
    };
    let head = format!(
        "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{boundary}\r\nContent-Type: {}\r\n\r\n",
        file.mime_type
    );
    let tail = format!("\r\n--{boundary}--\r\n");

    let mut body = Vec::with_capacity(head.len() + file.content.len() + tail.len());
    body.extend_from_slice(head.as_bytes());
    body.extend_from_slice(&file.content);
    body.extend_from_slice(tail.as_bytes());
    body
}

pub fn parse_file(v: &Value) -> Result<DriveFile> {
    let id = v["id"].as_str().ok_or_else(|| AdapterError::Decode {
        app: AppId::GDrive,
        reason: "file response has no id".into(),
    })?;
    Ok(DriveFile {
        id: id.to_string(),
        name: v["name"].as_str().unwrap_or_default().to_string(),
        mime_type: v["mimeType"].as_str().unwrap_or_default().to_string(),
        web_view_link: v["webViewLink"].as_str().unwrap_or_default().to_string(),
    })
}
