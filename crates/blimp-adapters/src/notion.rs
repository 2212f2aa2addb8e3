//! Notion API client.

use async_trait::async_trait;
use blimp_kernel::AppId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Result;
use crate::http::{HttpClient, join, segment};

const NOTION_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Property names tried, in order, when looking for a page title.
const TITLE_PROPERTIES: [&str; 4] = ["Name", "Title", "title", "name"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionPage {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn query_database(
        &self,
        token: &str,
        database_id: &str,
        page_size: u32,
    ) -> Result<Vec<NotionPage>>;
}

#[derive(Debug, Clone)]
pub struct NotionHttp {
    http: HttpClient,
    base_url: String,
}

impl NotionHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: NOTION_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl NotionApi for NotionHttp {
    async fn query_database(
        &self,
        token: &str,
        database_id: &str,
        page_size: u32,
    ) -> Result<Vec<NotionPage>> {
        let url = join(&self.base_url, &format!("/databases/{}/query", segment(database_id)));
        let request = self
            .http
            .post(&url, token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "page_size": page_size }));
        let body = self.http.send(AppId::Notion, request).await?;
        Ok(body["results"]
            .as_array()
            .map(|pages| pages.iter().map(parse_page).collect())
            .unwrap_or_default())
    }
}

pub fn parse_page(v: &Value) -> NotionPage {
    let title = TITLE_PROPERTIES
        .iter()
        .map(|name| &v["properties"][*name])
        .find(|prop| prop["type"].as_str() == Some("title"))
        .and_then(|prop| prop["title"][0]["plain_text"].as_str())
        .unwrap_or("Untitled");
    NotionPage {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        title: title.to_string(),
        url: v["url"].as_str().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_name_property() {
        let page = parse_page(&json!({
            "id": "p1",
            "url": "https://notion.so/p1",
            "properties": {
                "Status": { "type": "select" },
                "Name": { "type": "title", "title": [{ "plain_text": "Roadmap" }] }
            }
        }));
        assert_eq!(page.title, "Roadmap");
        assert_eq!(page.url, "https://notion.so/p1");
    }

    #[test]
    fn untitled_when_no_title_property() {
        let page = parse_page(&json!({
            "id": "p2",
            "properties": { "Name": { "type": "rich_text" } }
        }));
        assert_eq!(page.title, "Untitled");
    }
}
