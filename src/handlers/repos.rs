// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose owners, repositories and profiles as tree entries.
// Author: Lukas Bower

//! Handlers for `/repos`, owners, repository overviews, READMEs and the
//! starred listing.

use std::sync::{Arc, Mutex};

use log::info;
use ninep_wire::{OpenMode, Stat};

use crate::dynamic::{basename, parent, window, BasicDir, Fid, FileHandler, StaticFile};
use crate::error::{FsError, Result};
use crate::handlers::{fmt_time, issues, HandlerCtx};
use crate::markform::{marshal, unmarshal, Field, Record};
use crate::upstream::{Branch, Owner, OwnerKind, Repo, Subscription};

/// `/repos`: a directory of owners discovered lazily during walks. On a
/// fresh read the authenticated user and the accounts they follow are
/// seeded so listings are not empty.
pub struct ReposHandler {
    ctx: HandlerCtx,
    dir: BasicDir,
}

impl ReposHandler {
    /// Build the handler over the shared table.
    #[must_use]
    pub fn new(ctx: HandlerCtx) -> Self {
        let dir = BasicDir::new(Arc::clone(&ctx.tree));
        Self { ctx, dir }
    }
}

impl FileHandler for ReposHandler {
    fn walk_child(&self, name: &str, child: &str) -> Result<usize> {
        match self.dir.walk_child(name, child) {
            Ok(idx) => Ok(idx),
            Err(_) => {
                info!("checking whether owner {child} exists");
                new_owner(&self.ctx, child)
            }
        }
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.dir.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        if offset == 0 && count > 0 {
            if let Some(login) = self.ctx.upstream.current_user() {
                new_owner(&self.ctx, &login)?;
                for followed in self.ctx.upstream.following(&login)? {
                    info!("adding followed account {followed}");
                    new_owner(&self.ctx, &followed)?;
                }
            }
        }
        self.dir.read(name, fid, offset, count)
    }

    fn write(&self, _name: &str, _fid: Fid, _offset: u64, _data: &[u8]) -> Result<u32> {
        Err(FsError::NotSupported("creating a new user or organization"))
    }
}

/// Probe an owner upstream and create its directory and profile entries.
/// Idempotent: an existing owner returns its existing index.
fn new_owner(ctx: &HandlerCtx, owner: &str) -> Result<usize> {
    // Hidden names are never forge accounts; clients probe for them
    // heavily, so refuse without an upstream round trip.
    if owner.starts_with('.') {
        return Err(FsError::NotFound(owner.to_string()));
    }

    let (kind, profile_name) = match ctx.upstream.org(owner) {
        Ok(_) => (OwnerKind::Organization, "0org.md"),
        Err(_) => match ctx.upstream.user(owner) {
            Ok(_) => (OwnerKind::User, "0user.md"),
            Err(err) => return Err(err),
        },
    };

    let owner_path = format!("/repos/{owner}");
    let idx = ctx
        .tree
        .add(&owner_path, Arc::new(OwnerHandler::new(ctx.clone())));
    ctx.tree.add(
        &format!("{owner_path}/{profile_name}"),
        Arc::new(ProfileFile::new(ctx.clone(), kind)),
    );
    Ok(idx)
}

/// `/repos/<owner>`: a directory of the owner's repositories, paged in
/// from upstream on demand.
pub struct OwnerHandler {
    ctx: HandlerCtx,
    dir: BasicDir,
}

impl OwnerHandler {
    /// Build the handler over the shared table.
    #[must_use]
    pub fn new(ctx: HandlerCtx) -> Self {
        let dir = BasicDir::new(Arc::clone(&ctx.tree));
        Self { ctx, dir }
    }

    fn refresh(&self, owner: &str) -> Result<()> {
        info!("listing repositories for {owner}");
        for repo in self.ctx.upstream.repositories(owner)? {
            let repo_path = format!("/repos/{owner}/{}", repo.name);
            self.ctx
                .tree
                .add(&repo_path, Arc::new(BasicDir::new(Arc::clone(&self.ctx.tree))));
            self.ctx.tree.add(
                &format!("{repo_path}/repo.md"),
                Arc::new(RepoOverview::new(self.ctx.clone())),
            );
            self.ctx.tree.add(
                &format!("{repo_path}/README.md"),
                Arc::new(ReadmeFile::new(self.ctx.clone())),
            );
            issues::attach(&self.ctx, &repo_path, owner, &repo.name);
        }
        Ok(())
    }
}

impl FileHandler for OwnerHandler {
    fn walk_child(&self, name: &str, child: &str) -> Result<usize> {
        if let Ok(idx) = self.dir.walk_child(name, child) {
            return Ok(idx);
        }
        // Hidden names are never repositories; skip the upstream refresh.
        if child.starts_with('.') {
            return Err(FsError::NotFound(child.to_string()));
        }
        self.refresh(basename(name))?;
        self.dir.walk_child(name, child)
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.dir.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        if offset == 0 && count > 0 {
            self.refresh(basename(name))?;
        }
        self.dir.read(name, fid, offset, count)
    }

    fn write(&self, _name: &str, _fid: Fid, _offset: u64, _data: &[u8]) -> Result<u32> {
        Err(FsError::NotSupported("creating repositories"))
    }
}

/// `0user.md` / `0org.md`: a profile document snapshotted on open.
pub struct ProfileFile {
    ctx: HandlerCtx,
    kind: OwnerKind,
    file: StaticFile,
}

impl ProfileFile {
    /// Build a profile file of the given kind.
    #[must_use]
    pub fn new(ctx: HandlerCtx, kind: OwnerKind) -> Self {
        Self { ctx, kind, file: StaticFile::new("") }
    }
}

impl FileHandler for ProfileFile {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let login = basename(&parent(name)).to_string();
        info!("reading profile of {login}");
        let owner = match self.kind {
            OwnerKind::Organization => self.ctx.upstream.org(&login)?,
            OwnerKind::User => self.ctx.upstream.user(&login)?,
        };
        self.file.set_content(render_owner(&owner).into_bytes());
        self.file.open(name, fid, mode)
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.file.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.file.read(name, fid, offset, count)
    }
}

fn render_owner(owner: &Owner) -> String {
    let mut doc = format!(
        "# {} - {}\n\n",
        owner.name.as_deref().unwrap_or(&owner.login),
        owner.login
    );
    doc.push_str(&format!(
        "Location: {}\nEmail: {}\n\n",
        owner.location.as_deref().unwrap_or(""),
        owner.email.as_deref().unwrap_or("")
    ));
    if let Some(bio) = &owner.bio {
        if !bio.is_empty() {
            doc.push_str(bio);
            doc.push_str("\n\n");
        }
    }
    doc.push_str(&format!(
        "Created: {}\nUpdated: {}\nFollowers: {}\n",
        fmt_time(owner.created_at),
        fmt_time(owner.updated_at),
        owner.followers
    ));
    doc
}

const NOT_WATCHING: &str = "not watching";
const WATCHING: &str = "watching";
const IGNORING: &str = "ignoring";

fn overview_form(description: &str, starred: bool, notifications: &str) -> Record {
    Record::new()
        .field("Description", Field::text(description))
        .field("Starred", Field::flag(starred))
        .field(
            "Notifications",
            Field::radio(&[NOT_WATCHING, WATCHING, IGNORING], notifications),
        )
}

struct OverviewState {
    readbuf: Vec<u8>,
    writebuf: Vec<u8>,
    writer: Option<Fid>,
    form: Record,
}

/// `repo.md`: the writable repository overview. Open snapshots the
/// repository into a form record; clunk of the writer fid diffs the
/// edited form against the snapshot and pushes each change upstream.
pub struct RepoOverview {
    ctx: HandlerCtx,
    state: Mutex<OverviewState>,
}

impl RepoOverview {
    /// Build the overview handler.
    #[must_use]
    pub fn new(ctx: HandlerCtx) -> Self {
        Self {
            ctx,
            state: Mutex::new(OverviewState {
                readbuf: Vec::new(),
                writebuf: Vec::new(),
                writer: None,
                form: overview_form("", false, NOT_WATCHING),
            }),
        }
    }
}

fn repo_coords(name: &str) -> (String, String) {
    let repo_dir = parent(name);
    (basename(&parent(&repo_dir)).to_string(), basename(&repo_dir).to_string())
}

impl FileHandler for RepoOverview {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let (owner, repo) = repo_coords(name);
        info!("reading repository {owner}/{repo}");

        let mut state = self.state.lock().unwrap();
        if mode.is_writable() && state.writer.is_some() {
            return Err(FsError::Busy("repo metadata"));
        }

        let details = self.ctx.upstream.repository(&owner, &repo)?;
        let branch = match &details.default_branch {
            Some(branch) => Some(self.ctx.upstream.branch(&owner, &repo, branch)?),
            None => None,
        };
        let starred = self.ctx.upstream.is_starred(&owner, &repo)?;
        let subscription = self.ctx.upstream.subscription(&owner, &repo)?;

        let notifications = match subscription {
            Some(sub) if sub.subscribed => WATCHING,
            Some(sub) if sub.ignored => IGNORING,
            _ => NOT_WATCHING,
        };
        state.form = overview_form(
            details.description.as_deref().unwrap_or(""),
            starred,
            notifications,
        );
        let rendered = render_repo(&details, branch.as_ref(), &state.form);
        state.readbuf = rendered.into_bytes();

        if mode.is_writable() {
            state.writer = Some(fid);
            state.writebuf.clear();
        }
        Ok(())
    }

    fn stat(&self, _name: &str) -> Result<Stat> {
        Ok(Stat::file(self.state.lock().unwrap().readbuf.len() as u64))
    }

    fn wstat(&self, _name: &str, stat: &Stat) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.writebuf.truncate(stat.length as usize);
        Ok(())
    }

    fn read(&self, _name: &str, _fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        Ok(window(&self.state.lock().unwrap().readbuf, offset, count))
    }

    fn write(&self, _name: &str, fid: Fid, _offset: u64, data: &[u8]) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        if state.writer != Some(fid) {
            return Ok(data.len() as u32);
        }
        state.writebuf.extend_from_slice(data);
        Ok(data.len() as u32)
    }

    fn clunk(&self, name: &str, fid: Fid) -> Result<()> {
        let (owner, repo) = repo_coords(name);

        let mut state = self.state.lock().unwrap();
        if state.writer != Some(fid) {
            return Ok(());
        }
        state.writer = None;
        if state.writebuf.is_empty() {
            return Ok(());
        }

        let document = String::from_utf8_lossy(&state.writebuf).into_owned();
        state.writebuf.clear();
        let mut edited = state.form.blank();
        unmarshal(&document, &mut edited);

        let old_description = state.form.text_value("Description").unwrap_or_default();
        let new_description = edited.text_value("Description").unwrap_or_default();
        if new_description != old_description {
            self.ctx.upstream.set_description(&owner, &repo, new_description)?;
        }

        let old_starred = state.form.flag_value("Starred").unwrap_or(false);
        let new_starred = edited.flag_value("Starred").unwrap_or(false);
        if new_starred != old_starred {
            if new_starred {
                self.ctx.upstream.star(&owner, &repo)?;
            } else {
                self.ctx.upstream.unstar(&owner, &repo)?;
            }
        }

        let old_watch = state.form.text_value("Notifications").unwrap_or_default();
        let new_watch = edited.text_value("Notifications").unwrap_or_default();
        if new_watch != old_watch {
            match new_watch {
                WATCHING => self.ctx.upstream.subscribe(
                    &owner,
                    &repo,
                    Subscription { subscribed: true, ignored: false },
                )?,
                IGNORING => self.ctx.upstream.subscribe(
                    &owner,
                    &repo,
                    Subscription { subscribed: false, ignored: true },
                )?,
                NOT_WATCHING => self.ctx.upstream.unsubscribe(&owner, &repo)?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn render_repo(repo: &Repo, branch: Option<&Branch>, form: &Record) -> String {
    let mut doc = format!("# {}", repo.full_name);
    if repo.fork {
        if let Some(source) = &repo.source_full_name {
            doc.push_str(&format!(" [{source}](../../{source}/repo.md)"));
        }
    }
    doc.push_str("\n\n");

    doc.push_str(&marshal(form, "Description"));
    doc.push_str("\n\n");
    doc.push_str(&marshal(form, "Starred"));
    doc.push_str("\n\n");
    doc.push_str(&marshal(form, "Notifications"));
    doc.push_str("\n\n");

    doc.push_str(&format!(
        "Created: {}\nWatchers: {}\nStars: {}\nForks: {}\nDefault branch: {}\nPushed: {}\n",
        fmt_time(repo.created_at),
        repo.watchers_count,
        repo.stargazers_count,
        repo.forks_count,
        repo.default_branch.as_deref().unwrap_or(""),
        fmt_time(repo.pushed_at),
    ));
    if let Some(branch) = branch {
        doc.push_str(&format!("Commit: {} {}\n", branch.sha, fmt_time(branch.date)));
    }
    if let Some(url) = &repo.clone_url {
        doc.push_str(&format!("\ngit clone {url}\n"));
    }
    doc
}

/// `README.md`: the upstream README text, snapshotted on open.
pub struct ReadmeFile {
    ctx: HandlerCtx,
    file: StaticFile,
}

impl ReadmeFile {
    /// Build the README handler.
    #[must_use]
    pub fn new(ctx: HandlerCtx) -> Self {
        Self { ctx, file: StaticFile::new("") }
    }
}

impl FileHandler for ReadmeFile {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let (owner, repo) = repo_coords(name);
        let readme = self.ctx.upstream.readme(&owner, &repo)?;
        self.file.set_content(readme.into_bytes());
        self.file.open(name, fid, mode)
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.file.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.file.read(name, fid, offset, count)
    }
}

/// `/stars.md`: the authenticated account's starred repositories.
pub struct StarsFile {
    ctx: HandlerCtx,
    file: StaticFile,
}

impl StarsFile {
    /// Build the starred-listing handler.
    #[must_use]
    pub fn new(ctx: HandlerCtx) -> Self {
        Self { ctx, file: StaticFile::new("") }
    }
}

impl FileHandler for StarsFile {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let stars = self.ctx.upstream.starred()?;
        let mut doc = String::from("# Starred repositories\n\n");
        for repo in stars {
            doc.push_str(&format!("  * repos/{}\n", repo.full_name));
        }
        self.file.set_content(doc.into_bytes());
        self.file.open(name, fid, mode)
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.file.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        self.file.read(name, fid, offset, count)
    }
}
