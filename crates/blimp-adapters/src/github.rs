//! GitHub REST API v3 client.

use async_trait::async_trait;
use blimp_kernel::AppId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::http::{HttpClient, join, segment};

const GITHUB_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    /// First line of the commit message.
    pub title: String,
    pub author: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub url: String,
}

#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Most recent commits on the default branch.
    async fn list_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<Commit>>;

    /// Open pull requests, newest first.
    async fn list_pull_requests(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<PullRequest>>;
}

#[derive(Debug, Clone)]
pub struct GitHubHttp {
    http: HttpClient,
    base_url: String,
}

impl GitHubHttp {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: GITHUB_BASE_URL.to_string(),
        }
    }

    /// Point at a GitHub Enterprise instance.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(&join(&self.base_url, path), token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

#[async_trait]
impl GitHubApi for GitHubHttp {
    async fn list_commits(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<Commit>> {
        let path = format!("/repos/{}/{}/commits", segment(owner), segment(repo));
        let request = self.get(&path, token).query(&[("per_page", per_page)]);
        let body = self.http.send(AppId::GitHub, request).await?;
        Ok(array(&body).iter().map(parse_commit).collect())
    }

    async fn list_pull_requests(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        per_page: u32,
    ) -> Result<Vec<PullRequest>> {
        let path = format!("/repos/{}/{}/pulls", segment(owner), segment(repo));
        let request = self
            .get(&path, token)
            .query(&[("state", "open".to_string()), ("per_page", per_page.to_string())]);
        let body = self.http.send(AppId::GitHub, request).await?;
        Ok(array(&body).iter().map(parse_pull_request).collect())
    }
}

fn array(v: &Value) -> &[Value] {
    v.as_array().map(Vec::as_slice).unwrap_or_default()
}

pub fn parse_commit(v: &Value) -> Commit {
    let message = v["commit"]["message"].as_str().unwrap_or_default();
    Commit {
        sha: v["sha"].as_str().unwrap_or_default().to_string(),
        title: message.lines().next().unwrap_or_default().to_string(),
        author: v["author"]["login"]
            .as_str()
            .or_else(|| v["commit"]["author"]["name"].as_str())
            .unwrap_or("unknown")
            .to_string(),
        url: v["html_url"].as_str().unwrap_or_default().to_string(),
    }
}

pub fn parse_pull_request(v: &Value) -> PullRequest {
    PullRequest {
        number: v["number"].as_u64().unwrap_or_default(),
        title: v["title"].as_str().unwrap_or_default().to_string(),
        author: v["user"]["login"].as_str().unwrap_or("unknown").to_string(),
        url: v["html_url"].as_str().unwrap_or_default().to_string(),
    }
}
