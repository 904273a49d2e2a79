// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose a repository's issues as a filtered dynamic directory.
// Author: Lukas Bower

//! Handlers for `issues/`, `filter.md`, `0list.md` and issue documents.
//!
//! The three fixed entries share an [`IssuesState`]: the current filter
//! and the set of basenames visible in listings. Refresh pages the issue
//! list upstream, creates `<N>.md` entries, and rebuilds the visible set;
//! entries that fall out of the filter stay in the table (their qid paths
//! must survive) but disappear from listings.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use ninep_wire::{OpenMode, Stat};

use crate::dynamic::{basename, parent, window, BasicDir, Fid, FileHandler, StaticFile};
use crate::error::{FsError, Result};
use crate::handlers::{fmt_time, indent, HandlerCtx};
use crate::markform::{marshal, unmarshal, Field, Record};
use crate::upstream::{Comment, Issue, IssueEdit, IssueFilter};

/// Shared state for one repository's issues directory.
pub struct IssuesState {
    ctx: HandlerCtx,
    owner: String,
    repo: String,
    filter: Mutex<IssueFilter>,
    visible: Mutex<HashSet<String>>,
}

impl IssuesState {
    fn fixed_entries() -> HashSet<String> {
        ["filter.md", "0list.md"].iter().map(|s| s.to_string()).collect()
    }

    fn dir_path(&self) -> String {
        format!("/repos/{}/{}/issues", self.owner, self.repo)
    }

    /// Page the issue list per the current filter, creating entries and
    /// rebuilding the visible set.
    fn refresh(&self) -> Result<Vec<Issue>> {
        info!("listing issues for {}/{}", self.owner, self.repo);
        let filter = self.filter.lock().unwrap().clone();
        let issues = self.ctx.upstream.issues(&self.owner, &self.repo, &filter)?;

        let mut visible = Self::fixed_entries();
        for issue in &issues {
            self.add_issue_entry(issue.number);
            visible.insert(format!("{}.md", issue.number));
        }
        *self.visible.lock().unwrap() = visible;
        Ok(issues)
    }

    fn add_issue_entry(&self, number: u64) -> usize {
        self.ctx.tree.add(
            &format!("{}/{}.md", self.dir_path(), number),
            Arc::new(IssueFile::new(self.ctx.clone(), number)),
        )
    }
}

/// Create the issues directory and its fixed children for a repository.
pub fn attach(ctx: &HandlerCtx, repo_path: &str, owner: &str, repo: &str) {
    let state = Arc::new(IssuesState {
        ctx: ctx.clone(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        filter: Mutex::new(IssueFilter::default()),
        visible: Mutex::new(IssuesState::fixed_entries()),
    });

    let issues_path = format!("{repo_path}/issues");
    ctx.tree
        .add(&issues_path, Arc::new(IssuesDir::new(Arc::clone(&state))));
    ctx.tree.add(
        &format!("{issues_path}/filter.md"),
        Arc::new(FilterFile::new(Arc::clone(&state))),
    );
    ctx.tree.add(
        &format!("{issues_path}/0list.md"),
        Arc::new(ListFile::new(state)),
    );
}

/// `issues/`: dynamic directory of filter-matching issues.
pub struct IssuesDir {
    state: Arc<IssuesState>,
    dir: BasicDir,
}

impl IssuesDir {
    fn new(state: Arc<IssuesState>) -> Self {
        let visible_state = Arc::clone(&state);
        let dir = BasicDir::with_filter(
            Arc::clone(&state.ctx.tree),
            Arc::new(move |name: &str| visible_state.visible.lock().unwrap().contains(name)),
        );
        Self { state, dir }
    }
}

impl FileHandler for IssuesDir {
    fn walk_child(&self, name: &str, child: &str) -> Result<usize> {
        if let Ok(idx) = self.dir.walk_child(name, child) {
            return Ok(idx);
        }
        let number: u64 = child
            .strip_suffix(".md")
            .and_then(|stem| stem.parse().ok())
            .ok_or_else(|| FsError::NotFound(child.to_string()))?;

        info!("checking whether issue {number} exists");
        self.state
            .ctx
            .upstream
            .issue(&self.state.owner, &self.state.repo, number)?;
        let idx = self.state.add_issue_entry(number);
        self.state
            .visible
            .lock()
            .unwrap()
            .insert(format!("{number}.md"));
        Ok(idx)
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        self.dir.stat(name)
    }

    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        if offset == 0 && count > 0 {
            self.state.refresh()?;
        }
        self.dir.read(name, fid, offset, count)
    }

    fn write(&self, _name: &str, _fid: Fid, _offset: u64, _data: &[u8]) -> Result<u32> {
        Err(FsError::NotSupported("creating an issue"))
    }
}

fn filter_record(filter: &IssueFilter) -> Record {
    let labels: Vec<&str> = filter.labels.iter().map(String::as_str).collect();
    Record::new()
        .field(
            "State",
            Field::radio(&["open", "closed", "all"], filter.state.clone()),
        )
        .field("Labels", Field::list(&labels))
        .field(
            "Assignee",
            Field::text_limited(39, filter.assignee.clone().unwrap_or_default()),
        )
        .field("Since", Field::time(filter.since))
}

fn record_filter(record: &Record) -> IssueFilter {
    let state = match record.text_value("State") {
        Some("") | None => "open".to_string(),
        Some(state) => state.to_string(),
    };
    let assignee = match record.text_value("Assignee") {
        Some("") | None => None,
        Some(assignee) => Some(assignee.to_string()),
    };
    IssueFilter {
        state,
        labels: record.items_value("Labels").unwrap_or_default().to_vec(),
        assignee,
        since: record.time_value("Since"),
    }
}

fn render_filter(record: &Record) -> String {
    format!(
        "# Issue filter\n\n{}\n\n{}\n\n{}\n\n{}\n\n\
         Save this file to change which issues are listed.\n",
        marshal(record, "State"),
        marshal(record, "Labels"),
        marshal(record, "Assignee"),
        marshal(record, "Since"),
    )
}

struct FilterBuffers {
    readbuf: Vec<u8>,
    writebuf: Vec<u8>,
    writer: Option<Fid>,
}

/// `filter.md`: the writable issue filter. Clunk of the writer fid parses
/// the edited form, replaces the filter, and refreshes the directory.
pub struct FilterFile {
    state: Arc<IssuesState>,
    buffers: Mutex<FilterBuffers>,
}

impl FilterFile {
    fn new(state: Arc<IssuesState>) -> Self {
        Self {
            state,
            buffers: Mutex::new(FilterBuffers {
                readbuf: Vec::new(),
                writebuf: Vec::new(),
                writer: None,
            }),
        }
    }
}

impl FileHandler for FilterFile {
    fn open(&self, _name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        if mode.is_writable() && buffers.writer.is_some() {
            return Err(FsError::Busy("issue filter"));
        }
        let record = filter_record(&self.state.filter.lock().unwrap());
        buffers.readbuf = render_filter(&record).into_bytes();
        if mode.is_writable() {
            buffers.writer = Some(fid);
            buffers.writebuf.clear();
        }
        Ok(())
    }

    fn stat(&self, _name: &str) -> Result<Stat> {
        Ok(Stat::file(self.buffers.lock().unwrap().readbuf.len() as u64))
    }

    fn wstat(&self, _name: &str, stat: &Stat) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        buffers.writebuf.truncate(stat.length as usize);
        Ok(())
    }

    fn read(&self, _name: &str, _fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        Ok(window(&self.buffers.lock().unwrap().readbuf, offset, count))
    }

    fn write(&self, _name: &str, fid: Fid, _offset: u64, data: &[u8]) -> Result<u32> {
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.writer != Some(fid) {
            return Ok(data.len() as u32);
        }
        buffers.writebuf.extend_from_slice(data);
        Ok(data.len() as u32)
    }

    fn clunk(&self, _name: &str, fid: Fid) -> Result<()> {
        let document = {
            let mut buffers = self.buffers.lock().unwrap();
            if buffers.writer != Some(fid) {
                return Ok(());
            }
            buffers.writer = None;
            if buffers.writebuf.is_empty() {
                return Ok(());
            }
            let document = String::from_utf8_lossy(&buffers.writebuf).into_owned();
            buffers.writebuf.clear();
            document
        };

        let mut record = filter_record(&self.state.filter.lock().unwrap()).blank();
        unmarshal(&document, &mut record);
        *self.state.filter.lock().unwrap() = record_filter(&record);
        self.state.refresh()?;
        Ok(())
    }
}

/// `0list.md`: a generated listing of the filter-matching issues.
pub struct ListFile {
    state: Arc<IssuesState>,
    file: StaticFile,
}

impl ListFile {
    fn new(state: Arc<IssuesState>) -> Self {
        Self { state, file: StaticFile::new("") }
    }
}

impl FileHandler for ListFile {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let issues = self.state.refresh()?;
        let mut doc = format!("# Issues for {}/{}\n\n", self.state.owner, self.state.repo);
        for issue in issues {
            doc.push_str(&format!(
                "  * [{number}.md]({number}.md) {title} ({state})\n",
                number = issue.number,
                title = issue.title,
                state = issue.state,
            ));
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

fn issue_form(issue: &Issue) -> Record {
    let labels: Vec<&str> = issue.labels.iter().map(String::as_str).collect();
    Record::new()
        .field("Title", Field::text(issue.title.clone()).required())
        .field(
            "State",
            Field::radio(&["open", "closed"], issue.state.clone()),
        )
        .field(
            "Assignee",
            Field::text_limited(39, issue.assignee.clone().unwrap_or_default()),
        )
        .field("Labels", Field::list(&labels))
}

fn render_issue(issue: &Issue, comments: &[Comment], form: &Record) -> String {
    let mut doc = format!("# {} (#{})\n\n", issue.title, issue.number);
    doc.push_str(&marshal(form, "Title"));
    doc.push_str("\n\n");
    doc.push_str(&marshal(form, "State"));
    doc.push_str("\n\n");
    doc.push_str(&marshal(form, "Assignee"));
    doc.push_str("\n\n");
    doc.push_str(&marshal(form, "Labels"));
    doc.push_str("\n\n");
    doc.push_str(&format!(
        "[{user}](../../../{user}) opened this issue {created} - {count} comments\n\n",
        user = issue.user,
        created = fmt_time(issue.created_at),
        count = issue.comments,
    ));
    doc.push_str(&indent(&issue.body));
    for comment in comments {
        doc.push_str(&format!(
            "\n## [{user}](../../../{user}) commented {created} ({assoc})\n\n",
            user = comment.user,
            created = fmt_time(comment.created_at),
            assoc = comment.author_association,
        ));
        doc.push_str(&indent(&comment.body));
    }
    doc
}

struct IssueBuffers {
    readbuf: Vec<u8>,
    writebuf: Vec<u8>,
    writer: Option<Fid>,
    form: Record,
}

/// `<N>.md`: one issue. Reading from offset zero refetches the issue and
/// its comments; writes accumulate and clunk pushes the edited title,
/// state, assignee and labels upstream.
pub struct IssueFile {
    ctx: HandlerCtx,
    number: u64,
    buffers: Mutex<IssueBuffers>,
}

impl IssueFile {
    fn new(ctx: HandlerCtx, number: u64) -> Self {
        Self {
            ctx,
            number,
            buffers: Mutex::new(IssueBuffers {
                readbuf: Vec::new(),
                writebuf: Vec::new(),
                writer: None,
                form: issue_form(&Issue::default()),
            }),
        }
    }
}

fn issue_coords(name: &str) -> (String, String) {
    let issues_dir = parent(name);
    let repo_dir = parent(&issues_dir);
    (basename(&parent(&repo_dir)).to_string(), basename(&repo_dir).to_string())
}

impl FileHandler for IssueFile {
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        if mode.is_writable() {
            if buffers.writer.is_some() {
                return Err(FsError::Busy("issue"));
            }
            // Snapshot the current fields so clunk can diff the edit.
            let (owner, repo) = issue_coords(name);
            let issue = self.ctx.upstream.issue(&owner, &repo, self.number)?;
            buffers.form = issue_form(&issue);
            buffers.writer = Some(fid);
            buffers.writebuf.clear();
        }
        Ok(())
    }

    fn stat(&self, _name: &str) -> Result<Stat> {
        Ok(Stat::file(self.buffers.lock().unwrap().readbuf.len() as u64))
    }

    fn wstat(&self, _name: &str, stat: &Stat) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        buffers.writebuf.truncate(stat.length as usize);
        Ok(())
    }

    fn read(&self, name: &str, _fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut buffers = self.buffers.lock().unwrap();
        if offset == 0 && count > 0 {
            info!("fetching issue {}", self.number);
            let (owner, repo) = issue_coords(name);
            let issue = self.ctx.upstream.issue(&owner, &repo, self.number)?;
            // A failed comment fetch degrades to the bare issue document.
            let comments = match self.ctx.upstream.comments(&owner, &repo, self.number) {
                Ok(comments) => comments,
                Err(err) => {
                    warn!("comments for {owner}/{repo}#{}: {err}", self.number);
                    Vec::new()
                }
            };
            buffers.form = issue_form(&issue);
            let rendered = render_issue(&issue, &comments, &buffers.form);
            buffers.readbuf = rendered.into_bytes();
        }
        Ok(window(&buffers.readbuf, offset, count))
    }

    fn write(&self, _name: &str, fid: Fid, _offset: u64, data: &[u8]) -> Result<u32> {
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.writer != Some(fid) {
            return Ok(data.len() as u32);
        }
        buffers.writebuf.extend_from_slice(data);
        Ok(data.len() as u32)
    }

    fn clunk(&self, name: &str, fid: Fid) -> Result<()> {
        let mut buffers = self.buffers.lock().unwrap();
        if buffers.writer != Some(fid) {
            return Ok(());
        }
        buffers.writer = None;
        if buffers.writebuf.is_empty() {
            return Ok(());
        }

        let document = String::from_utf8_lossy(&buffers.writebuf).into_owned();
        buffers.writebuf.clear();
        let mut edited = buffers.form.blank();
        unmarshal(&document, &mut edited);
        edited.validate().map_err(|err| {
            FsError::Codec(format!("issue {}: {err}", self.number))
        })?;

        let mut edit = IssueEdit::default();
        if edited.text_value("Title") != buffers.form.text_value("Title") {
            edit.title = edited.text_value("Title").map(str::to_string);
        }
        if edited.text_value("State") != buffers.form.text_value("State") {
            edit.state = edited.text_value("State").map(str::to_string);
        }
        if edited.text_value("Assignee") != buffers.form.text_value("Assignee") {
            edit.assignee = Some(match edited.text_value("Assignee") {
                Some("") | None => None,
                Some(assignee) => Some(assignee.to_string()),
            });
        }
        if edited.items_value("Labels") != buffers.form.items_value("Labels") {
            edit.labels = Some(edited.items_value("Labels").unwrap_or_default().to_vec());
        }

        if !edit.is_empty() {
            let (owner, repo) = issue_coords(name);
            self.ctx.upstream.edit_issue(&owner, &repo, self.number, &edit)?;
        }
        Ok(())
    }
}
