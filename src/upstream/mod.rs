// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the upstream forge interface consumed by handlers.
// Author: Lukas Bower

//! The opaque upstream collaborator.
//!
//! Application handlers make every outbound call through [`Upstream`];
//! the server core never sees HTTP. [`http::HttpUpstream`] is the REST
//! implementation; tests script the trait directly.

pub mod http;

pub use http::HttpUpstream;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Whether an owner is a person or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnerKind {
    /// An individual account.
    #[default]
    User,
    /// An organization account.
    Organization,
}

/// A repository owner: user or organization profile.
#[derive(Debug, Clone, Default)]
pub struct Owner {
    /// Account login.
    pub login: String,
    /// Display name.
    pub name: Option<String>,
    /// Account kind.
    pub kind: OwnerKind,
    /// Free-form location.
    pub location: Option<String>,
    /// Public email.
    pub email: Option<String>,
    /// Profile text: bio for users, description for organizations.
    pub bio: Option<String>,
    /// Account creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last profile update.
    pub updated_at: Option<DateTime<Utc>>,
    /// Follower count.
    pub followers: u64,
}

/// A repository overview.
#[derive(Debug, Clone, Default)]
pub struct Repo {
    /// Short name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// One-line description.
    pub description: Option<String>,
    /// Whether the repository is a fork.
    pub fork: bool,
    /// `owner/name` of the fork source, when forked.
    pub source_full_name: Option<String>,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last push time.
    pub pushed_at: Option<DateTime<Utc>>,
    /// Watcher count.
    pub watchers_count: u64,
    /// Star count.
    pub stargazers_count: u64,
    /// Fork count.
    pub forks_count: u64,
    /// Default branch name.
    pub default_branch: Option<String>,
    /// Clone URL.
    pub clone_url: Option<String>,
}

impl Repo {
    /// Owner login parsed out of `full_name`.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.full_name.split('/').next().unwrap_or_default()
    }
}

/// Tip of a branch.
#[derive(Debug, Clone, Default)]
pub struct Branch {
    /// Branch name.
    pub name: String,
    /// Tip commit SHA.
    pub sha: String,
    /// Tip commit author date.
    pub date: Option<DateTime<Utc>>,
}

/// An issue snapshot.
#[derive(Debug, Clone, Default)]
pub struct Issue {
    /// Issue number within its repository.
    pub number: u64,
    /// Title line.
    pub title: String,
    /// `open` or `closed`.
    pub state: String,
    /// Login of the reporter.
    pub user: String,
    /// Login of the assignee, when assigned.
    pub assignee: Option<String>,
    /// Label names.
    pub labels: Vec<String>,
    /// Comment count.
    pub comments: u64,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Body text.
    pub body: String,
}

/// A comment on an issue.
#[derive(Debug, Clone, Default)]
pub struct Comment {
    /// Login of the commenter.
    pub user: String,
    /// Relationship of the commenter to the repository.
    pub author_association: String,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Body text.
    pub body: String,
}

/// Notification subscription state for a repository.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Subscription {
    /// Receive notifications.
    #[serde(default)]
    pub subscribed: bool,
    /// Suppress all notifications.
    #[serde(default)]
    pub ignored: bool,
}

/// Server-side issue listing filter.
#[derive(Debug, Clone)]
pub struct IssueFilter {
    /// `open`, `closed` or `all`.
    pub state: String,
    /// Require all of these labels.
    pub labels: Vec<String>,
    /// Require this assignee.
    pub assignee: Option<String>,
    /// Only issues updated at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl Default for IssueFilter {
    fn default() -> Self {
        Self { state: "open".to_string(), labels: Vec::new(), assignee: None, since: None }
    }
}

/// Fields of an issue that can be pushed back upstream. `None` leaves the
/// field untouched.
#[derive(Debug, Clone, Default)]
pub struct IssueEdit {
    /// New title.
    pub title: Option<String>,
    /// New state.
    pub state: Option<String>,
    /// New assignee login; `Some(None)` clears the assignee.
    pub assignee: Option<Option<String>>,
    /// Replacement label set.
    pub labels: Option<Vec<String>>,
}

impl IssueEdit {
    /// True when no field would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.state.is_none()
            && self.assignee.is_none()
            && self.labels.is_none()
    }
}

/// Everything the application handlers ask of the forge.
///
/// Implementations are shared across connections and must be internally
/// thread-safe. Calls may block on the network.
pub trait Upstream: Send + Sync {
    /// Login of the authenticated account, when a token was supplied.
    fn current_user(&self) -> Option<String>;

    /// Fetch a user profile.
    fn user(&self, login: &str) -> Result<Owner>;

    /// Fetch an organization profile.
    fn org(&self, login: &str) -> Result<Owner>;

    /// Logins the given user follows.
    fn following(&self, login: &str) -> Result<Vec<String>>;

    /// All repositories belonging to an owner.
    fn repositories(&self, owner: &str) -> Result<Vec<Repo>>;

    /// One repository.
    fn repository(&self, owner: &str, repo: &str) -> Result<Repo>;

    /// Replace a repository's description.
    fn set_description(&self, owner: &str, repo: &str, description: &str) -> Result<()>;

    /// Tip of a branch.
    fn branch(&self, owner: &str, repo: &str, branch: &str) -> Result<Branch>;

    /// Raw README content.
    fn readme(&self, owner: &str, repo: &str) -> Result<String>;

    /// Repositories starred by the authenticated account.
    fn starred(&self) -> Result<Vec<Repo>>;

    /// Whether the authenticated account starred the repository.
    fn is_starred(&self, owner: &str, repo: &str) -> Result<bool>;

    /// Star the repository.
    fn star(&self, owner: &str, repo: &str) -> Result<()>;

    /// Remove the star.
    fn unstar(&self, owner: &str, repo: &str) -> Result<()>;

    /// Notification subscription, when one exists.
    fn subscription(&self, owner: &str, repo: &str) -> Result<Option<Subscription>>;

    /// Set the notification subscription.
    fn subscribe(&self, owner: &str, repo: &str, sub: Subscription) -> Result<()>;

    /// Delete the notification subscription.
    fn unsubscribe(&self, owner: &str, repo: &str) -> Result<()>;

    /// Issues matching the filter.
    fn issues(&self, owner: &str, repo: &str, filter: &IssueFilter) -> Result<Vec<Issue>>;

    /// One issue.
    fn issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue>;

    /// Push edited issue fields upstream.
    fn edit_issue(&self, owner: &str, repo: &str, number: u64, edit: &IssueEdit) -> Result<()>;

    /// Comments on an issue, oldest first.
    fn comments(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<Comment>>;
}
