//! Typed view over delivery payloads.
//!
//! The handler contract stays payload-agnostic (raw bytes + event type); this
//! module is for collaborators that want to interpret the payload. Known event
//! kinds decode into typed structs carrying the fields commonly acted upon,
//! everything else is kept as raw bytes.

use bytes::Bytes;
use serde::Deserialize;

/// A decoded GitHub webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GitHubEvent {
    Ping(PingEvent),
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    Issues(IssuesEvent),
    IssueComment(IssueCommentEvent),
    Release(ReleaseEvent),
    /// Any event type without a typed representation.
    Unrecognized { event_type: String, raw: Bytes },
}

impl GitHubEvent {
    /// Decodes `payload` according to `event_type`.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when a known event type carries a payload that
    /// does not match its schema. Unknown event types never fail.
    pub fn parse(event_type: &str, payload: &Bytes) -> Result<Self, serde_json::Error> {
        let event = match event_type {
            "ping" => GitHubEvent::Ping(serde_json::from_slice(payload)?),
            "push" => GitHubEvent::Push(serde_json::from_slice(payload)?),
            "pull_request" => GitHubEvent::PullRequest(serde_json::from_slice(payload)?),
            "issues" => GitHubEvent::Issues(serde_json::from_slice(payload)?),
            "issue_comment" => GitHubEvent::IssueComment(serde_json::from_slice(payload)?),
            "release" => GitHubEvent::Release(serde_json::from_slice(payload)?),
            other => GitHubEvent::Unrecognized {
                event_type: other.to_string(),
                raw: payload.clone(),
            },
        };
        Ok(event)
    }

    /// The event type this value was decoded from.
    pub fn event_type(&self) -> &str {
        match self {
            GitHubEvent::Ping(_) => "ping",
            GitHubEvent::Push(_) => "push",
            GitHubEvent::PullRequest(_) => "pull_request",
            GitHubEvent::Issues(_) => "issues",
            GitHubEvent::IssueComment(_) => "issue_comment",
            GitHubEvent::Release(_) => "release",
            GitHubEvent::Unrecognized { event_type, .. } => event_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub login: String,
}

/// Sent once by GitHub when the hook is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PingEvent {
    #[serde(default)]
    pub zen: Option<String>,
    #[serde(default)]
    pub hook_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub repository: Option<Repository>,
}

impl PushEvent {
    /// Whether any commit added, modified or removed a file whose final path
    /// component equals `file_name`.
    pub fn touches_file(&self, file_name: &str) -> bool {
        self.commits.iter().any(|commit| {
            commit
                .added
                .iter()
                .chain(&commit.modified)
                .chain(&commit.removed)
                .any(|path| path.rsplit('/').next() == Some(file_name))
        })
    }

    /// Branch name when the ref is a branch (`refs/heads/...`).
    pub fn branch(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/heads/")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    #[serde(default)]
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub merged: Option<bool>,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: Issue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub body: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseEvent {
    pub action: String,
    pub release: Release,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
}
