//! `github+slack`: post a repository update to a channel.

use std::sync::Arc;

use async_trait::async_trait;
use blimp_kernel::{
    AppId, CapabilityHandler, CapabilityKey, CredentialSet, HandlerError, KeywordPredicate,
    OperationSpec,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Params, token, unknown_operation};
use crate::github::{Commit, GitHubApi, PullRequest};
use crate::slack::SlackApi;

pub const REPOSITORY_UPDATES_TO_SLACK: &str = "repository_updates_to_slack";

const DEFAULT_MAX_COMMITS: u32 = 5;
const MAX_PULL_REQUESTS: u32 = 5;

pub struct GitHubSlackHandler {
    github: Arc<dyn GitHubApi>,
    slack: Arc<dyn SlackApi>,
    operations: Vec<OperationSpec>,
}

impl GitHubSlackHandler {
    pub fn new(github: Arc<dyn GitHubApi>, slack: Arc<dyn SlackApi>) -> blimp_kernel::Result<Self> {
        let operations = vec![OperationSpec::new(
            REPOSITORY_UPDATES_TO_SLACK,
            "Post recent commits and open pull requests to a Slack channel",
            KeywordPredicate::new()
                .any_of(&["github", "repo", "commit"])?
                .any_of(&["slack"])?,
        )];
        Ok(Self {
            github,
            slack,
            operations,
        })
    }

    async fn updates_to_slack(
        &self,
        credentials: &CredentialSet,
        params: &Value,
    ) -> Result<Value, HandlerError> {
        let github_token = token(credentials, AppId::GitHub)?;
        let slack_token = token(credentials, AppId::Slack)?;
        let p = Params::new(params);
        let (owner, repo) = repository(&p)?;
        let channel = p.required_str("channel")?;
        let max_commits = p.count("max_commits", DEFAULT_MAX_COMMITS)?;

        let commits = self
            .github
            .list_commits(github_token, owner, repo, max_commits)
            .await?;

        let mut errors = Vec::new();
        let pulls = match self
            .github
            .list_pull_requests(github_token, owner, repo, MAX_PULL_REQUESTS)
            .await
        {
            Ok(pulls) => pulls,
            Err(e) => {
                warn!(owner, repo, error = %e, "failed to list pull requests");
                errors.push(format!("Failed to list pull requests: {e}"));
                Vec::new()
            }
        };

        let text = update_message(&format!("{owner}/{repo}"), &commits, &pulls);
        let posted = self.slack.post_message(slack_token, channel, &text).await?;
        info!(
            owner,
            repo,
            commits = commits.len(),
            pulls = pulls.len(),
            "repository update posted"
        );

        Ok(json!({
            "success": true,
            "messages_sent": 1,
            "commits": commits.len(),
            "pull_requests": pulls.len(),
            "slack_message": posted,
            "errors": errors,
            "message": "Repository update sent to Slack",
        }))
    }
}

/// `owner` + `repo`, or a single `repo` of the form `owner/name`.
fn repository<'a>(p: &Params<'a>) -> Result<(&'a str, &'a str), HandlerError> {
    let repo = p.required_str("repo")?;
    match p.str("owner") {
        Some(owner) => Ok((owner, repo)),
        None => repo
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty())
            .ok_or_else(|| {
                HandlerError::invalid_params("`owner` is required unless `repo` is `owner/name`")
            }),
    }
}

pub fn update_message(full_name: &str, commits: &[Commit], pulls: &[PullRequest]) -> String {
    let mut text = format!("🚀 *GitHub Repository Update: {full_name}*\n\n");
    text.push_str(&format!("📝 Recent Commits ({}):\n", commits.len()));
    for c in commits {
        let short: String = c.sha.chars().take(7).collect();
        text.push_str(&format!("  • {} ({short}) by {}\n", c.title, c.author));
    }
    if !pulls.is_empty() {
        text.push_str(&format!("\n🔄 Open PRs ({}):\n", pulls.len()));
        for pr in pulls {
            text.push_str(&format!("  • {} (#{})\n", pr.title, pr.number));
        }
    }
    text
}

#[async_trait]
impl CapabilityHandler for GitHubSlackHandler {
    fn capability(&self) -> CapabilityKey {
        CapabilityKey::pair(AppId::GitHub, AppId::Slack)
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
            REPOSITORY_UPDATES_TO_SLACK => self.updates_to_slack(credentials, parameters).await,
            _ => Err(unknown_operation(operation)),
        }
    }
}
