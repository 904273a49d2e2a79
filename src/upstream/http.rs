// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Implement the upstream interface over the forge REST API.
// Author: Lukas Bower

//! REST implementation of [`Upstream`].
//!
//! Anonymous when no token is supplied; rate limits then apply. List
//! endpoints are paged internally so handlers always see complete result
//! sets. Upstream failures carry the HTTP status and body verbatim.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use ureq::Agent;

use crate::error::{FsError, Result};
use crate::upstream::{
    Branch, Comment, Issue, IssueEdit, IssueFilter, Owner, OwnerKind, Repo, Subscription, Upstream,
};

const PER_PAGE: usize = 50;

/// Forge REST client.
pub struct HttpUpstream {
    agent: Agent,
    base: String,
    token: Option<String>,
    login: Option<String>,
}

impl HttpUpstream {
    /// Build a client for `base`, probing the authenticated login when a
    /// token is supplied.
    #[must_use]
    pub fn connect(base: &str, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        let mut upstream = Self {
            agent,
            base: base.trim_end_matches('/').to_string(),
            token,
            login: None,
        };
        if upstream.token.is_some() {
            match upstream.get_json::<ApiOwner>("/user") {
                Ok(me) => {
                    info!("authenticated as {}", me.login);
                    upstream.login = Some(me.login);
                }
                Err(err) => warn!("token probe failed, staying anonymous: {err}"),
            }
        }
        upstream
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, &format!("{}{path}", self.base))
            .set("Accept", "application/vnd.github.v3+json")
            .set("User-Agent", "forgefs");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request("GET", path).call().map_err(upstream_err)?;
        response
            .into_json()
            .map_err(|err| FsError::Upstream(err.to_string()))
    }

    /// Collect a paged list endpoint into one vector.
    fn get_paged<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut page = 1usize;
        loop {
            let mut request = self
                .request("GET", path)
                .query("per_page", &PER_PAGE.to_string())
                .query("page", &page.to_string());
            for (key, value) in query {
                request = request.query(key, value);
            }
            let response = request.call().map_err(upstream_err)?;
            let batch: Vec<T> = response
                .into_json()
                .map_err(|err| FsError::Upstream(err.to_string()))?;
            let done = batch.len() < PER_PAGE;
            out.extend(batch);
            if done {
                return Ok(out);
            }
            page += 1;
        }
    }

    fn send_empty(&self, method: &str, path: &str) -> Result<()> {
        self.request(method, path)
            .set("Content-Length", "0")
            .call()
            .map_err(upstream_err)?;
        Ok(())
    }

    fn send_json(&self, method: &str, path: &str, body: serde_json::Value) -> Result<()> {
        self.request(method, path)
            .send_json(body)
            .map_err(upstream_err)?;
        Ok(())
    }
}

fn upstream_err(err: ureq::Error) -> FsError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            let body = body.trim();
            if body.is_empty() {
                FsError::Upstream(format!("upstream returned {code}"))
            } else {
                FsError::Upstream(format!("upstream returned {code}: {body}"))
            }
        }
        ureq::Error::Transport(transport) => FsError::Upstream(transport.to_string()),
    }
}

impl Upstream for HttpUpstream {
    fn current_user(&self) -> Option<String> {
        self.login.clone()
    }

    fn user(&self, login: &str) -> Result<Owner> {
        Ok(self.get_json::<ApiOwner>(&format!("/users/{login}"))?.into())
    }

    fn org(&self, login: &str) -> Result<Owner> {
        Ok(self.get_json::<ApiOwner>(&format!("/orgs/{login}"))?.into())
    }

    fn following(&self, login: &str) -> Result<Vec<String>> {
        let users: Vec<ApiActor> = self.get_paged(&format!("/users/{login}/following"), &[])?;
        Ok(users.into_iter().map(|actor| actor.login).collect())
    }

    fn repositories(&self, owner: &str) -> Result<Vec<Repo>> {
        let repos: Vec<ApiRepo> = self.get_paged(&format!("/users/{owner}/repos"), &[])?;
        Ok(repos.into_iter().map(Into::into).collect())
    }

    fn repository(&self, owner: &str, repo: &str) -> Result<Repo> {
        Ok(self.get_json::<ApiRepo>(&format!("/repos/{owner}/{repo}"))?.into())
    }

    fn set_description(&self, owner: &str, repo: &str, description: &str) -> Result<()> {
        self.send_json(
            "PATCH",
            &format!("/repos/{owner}/{repo}"),
            serde_json::json!({ "name": repo, "description": description }),
        )
    }

    fn branch(&self, owner: &str, repo: &str, branch: &str) -> Result<Branch> {
        let raw: ApiBranch = self.get_json(&format!("/repos/{owner}/{repo}/branches/{branch}"))?;
        Ok(Branch {
            name: raw.name,
            sha: raw.commit.as_ref().map(|c| c.sha.clone()).unwrap_or_default(),
            date: raw
                .commit
                .and_then(|c| c.commit)
                .and_then(|d| d.author)
                .and_then(|a| a.date),
        })
    }

    fn readme(&self, owner: &str, repo: &str) -> Result<String> {
        let response = self
            .request("GET", &format!("/repos/{owner}/{repo}/readme"))
            .set("Accept", "application/vnd.github.raw")
            .call()
            .map_err(upstream_err)?;
        response
            .into_string()
            .map_err(|err| FsError::Upstream(err.to_string()))
    }

    fn starred(&self) -> Result<Vec<Repo>> {
        let repos: Vec<ApiRepo> = self.get_paged("/user/starred", &[])?;
        Ok(repos.into_iter().map(Into::into).collect())
    }

    fn is_starred(&self, owner: &str, repo: &str) -> Result<bool> {
        match self.request("GET", &format!("/user/starred/{owner}/{repo}")).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(err) => Err(upstream_err(err)),
        }
    }

    fn star(&self, owner: &str, repo: &str) -> Result<()> {
        self.send_empty("PUT", &format!("/user/starred/{owner}/{repo}"))
    }

    fn unstar(&self, owner: &str, repo: &str) -> Result<()> {
        self.send_empty("DELETE", &format!("/user/starred/{owner}/{repo}"))
    }

    fn subscription(&self, owner: &str, repo: &str) -> Result<Option<Subscription>> {
        match self
            .request("GET", &format!("/repos/{owner}/{repo}/subscription"))
            .call()
        {
            Ok(response) => Ok(Some(
                response
                    .into_json()
                    .map_err(|err| FsError::Upstream(err.to_string()))?,
            )),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(err) => Err(upstream_err(err)),
        }
    }

    fn subscribe(&self, owner: &str, repo: &str, sub: Subscription) -> Result<()> {
        self.send_json(
            "PUT",
            &format!("/repos/{owner}/{repo}/subscription"),
            serde_json::json!({ "subscribed": sub.subscribed, "ignored": sub.ignored }),
        )
    }

    fn unsubscribe(&self, owner: &str, repo: &str) -> Result<()> {
        self.send_empty("DELETE", &format!("/repos/{owner}/{repo}/subscription"))
    }

    fn issues(&self, owner: &str, repo: &str, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut query: Vec<(&str, String)> = vec![("state", filter.state.clone())];
        if !filter.labels.is_empty() {
            query.push(("labels", filter.labels.join(",")));
        }
        if let Some(assignee) = &filter.assignee {
            query.push(("assignee", assignee.clone()));
        }
        if let Some(since) = filter.since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        let issues: Vec<ApiIssue> =
            self.get_paged(&format!("/repos/{owner}/{repo}/issues"), &query)?;
        Ok(issues.into_iter().map(Into::into).collect())
    }

    fn issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue> {
        Ok(self
            .get_json::<ApiIssue>(&format!("/repos/{owner}/{repo}/issues/{number}"))?
            .into())
    }

    fn edit_issue(&self, owner: &str, repo: &str, number: u64, edit: &IssueEdit) -> Result<()> {
        let mut body = serde_json::Map::new();
        if let Some(title) = &edit.title {
            body.insert("title".to_string(), serde_json::json!(title));
        }
        if let Some(state) = &edit.state {
            body.insert("state".to_string(), serde_json::json!(state));
        }
        if let Some(assignee) = &edit.assignee {
            body.insert("assignee".to_string(), serde_json::json!(assignee));
        }
        if let Some(labels) = &edit.labels {
            body.insert("labels".to_string(), serde_json::json!(labels));
        }
        self.send_json(
            "PATCH",
            &format!("/repos/{owner}/{repo}/issues/{number}"),
            serde_json::Value::Object(body),
        )
    }

    fn comments(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<Comment>> {
        let comments: Vec<ApiComment> =
            self.get_paged(&format!("/repos/{owner}/{repo}/issues/{number}/comments"), &[])?;
        Ok(comments.into_iter().map(Into::into).collect())
    }
}

#[derive(Deserialize)]
struct ApiActor {
    login: String,
}

#[derive(Deserialize)]
struct ApiOwner {
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    followers: u64,
}

impl From<ApiOwner> for Owner {
    fn from(raw: ApiOwner) -> Self {
        Owner {
            login: raw.login,
            name: raw.name,
            kind: match raw.kind.as_deref() {
                Some("Organization") => OwnerKind::Organization,
                _ => OwnerKind::User,
            },
            location: raw.location,
            email: raw.email,
            bio: raw.bio.or(raw.description),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            followers: raw.followers,
        }
    }
}

#[derive(Deserialize)]
struct ApiRepoRef {
    full_name: String,
}

#[derive(Deserialize)]
struct ApiRepo {
    name: String,
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    source: Option<ApiRepoRef>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    watchers_count: u64,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    clone_url: Option<String>,
}

impl From<ApiRepo> for Repo {
    fn from(raw: ApiRepo) -> Self {
        Repo {
            name: raw.name,
            full_name: raw.full_name,
            description: raw.description,
            fork: raw.fork,
            source_full_name: raw.source.map(|s| s.full_name),
            created_at: raw.created_at,
            pushed_at: raw.pushed_at,
            watchers_count: raw.watchers_count,
            stargazers_count: raw.stargazers_count,
            forks_count: raw.forks_count,
            default_branch: raw.default_branch,
            clone_url: raw.clone_url,
        }
    }
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
    #[serde(default)]
    commit: Option<ApiBranchCommit>,
}

#[derive(Deserialize)]
struct ApiBranchCommit {
    sha: String,
    #[serde(default)]
    commit: Option<ApiCommitDetail>,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    #[serde(default)]
    author: Option<ApiCommitAuthor>,
}

#[derive(Deserialize)]
struct ApiCommitAuthor {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    state: String,
    #[serde(default)]
    user: Option<ApiActor>,
    #[serde(default)]
    assignee: Option<ApiActor>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
}

impl From<ApiIssue> for Issue {
    fn from(raw: ApiIssue) -> Self {
        Issue {
            number: raw.number,
            title: raw.title,
            state: raw.state,
            user: raw.user.map(|a| a.login).unwrap_or_default(),
            assignee: raw.assignee.map(|a| a.login),
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            comments: raw.comments,
            created_at: raw.created_at,
            body: raw.body.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct ApiComment {
    #[serde(default)]
    user: Option<ApiActor>,
    #[serde(default)]
    author_association: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<String>,
}

impl From<ApiComment> for Comment {
    fn from(raw: ApiComment) -> Self {
        Comment {
            user: raw.user.map(|a| a.login).unwrap_or_default(),
            author_association: raw.author_association,
            created_at: raw.created_at,
            body: raw.body.unwrap_or_default(),
        }
    }
}
