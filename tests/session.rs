// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the dispatcher end to end against a scripted upstream.
// Author: Lukas Bower

//! End-to-end dispatcher tests over a seeded tree and a scripted
//! in-memory upstream. No sockets: the session methods are driven
//! directly, the way a connection loop would.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use ninep_wire::{OpenMode, QidType, Stat, DMDIR, NOFID};

use forgefs::dynamic::{Dispatcher, NineServer};
use forgefs::error::FsError;
use forgefs::handlers::seed;
use forgefs::upstream::{
    Branch, Comment, Issue, IssueEdit, IssueFilter, Owner, OwnerKind, Repo, Subscription, Upstream,
};

/// Scripted forge: fixed data in, mutations recorded.
#[derive(Default)]
struct FakeUpstream {
    login: Option<String>,
    users: HashMap<String, Owner>,
    orgs: HashMap<String, Owner>,
    repos: HashMap<String, Vec<Repo>>,
    issues: HashMap<String, Vec<Issue>>,
    comments: HashMap<String, Vec<Comment>>,
    readmes: HashMap<String, String>,
    starred_names: Mutex<HashSet<String>>,
    mutations: Mutex<Vec<String>>,
    last_filter: Mutex<Option<IssueFilter>>,
    fail_comments: bool,
}

impl FakeUpstream {
    fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn record(&self, mutation: String) {
        self.mutations.lock().unwrap().push(mutation);
    }

    fn repo_key(owner: &str, repo: &str) -> String {
        format!("{owner}/{repo}")
    }
}

fn missing(what: &str) -> FsError {
    FsError::Upstream(format!("upstream returned 404: {what}"))
}

impl Upstream for FakeUpstream {
    fn current_user(&self) -> Option<String> {
        self.login.clone()
    }

    fn user(&self, login: &str) -> Result<Owner, FsError> {
        self.users.get(login).cloned().ok_or_else(|| missing(login))
    }

    fn org(&self, login: &str) -> Result<Owner, FsError> {
        self.orgs.get(login).cloned().ok_or_else(|| missing(login))
    }

    fn following(&self, _login: &str) -> Result<Vec<String>, FsError> {
        Ok(Vec::new())
    }

    fn repositories(&self, owner: &str) -> Result<Vec<Repo>, FsError> {
        self.repos.get(owner).cloned().ok_or_else(|| missing(owner))
    }

    fn repository(&self, owner: &str, repo: &str) -> Result<Repo, FsError> {
        self.repos
            .get(owner)
            .and_then(|repos| repos.iter().find(|r| r.name == repo))
            .cloned()
            .ok_or_else(|| missing(repo))
    }

    fn set_description(&self, owner: &str, repo: &str, description: &str) -> Result<(), FsError> {
        self.record(format!("describe {owner}/{repo}: {description}"));
        Ok(())
    }

    fn branch(&self, _owner: &str, _repo: &str, branch: &str) -> Result<Branch, FsError> {
        Ok(Branch {
            name: branch.to_string(),
            sha: "f00dcafe".to_string(),
            date: Some("2020-05-06T07:08:09Z".parse().unwrap()),
        })
    }

    fn readme(&self, owner: &str, repo: &str) -> Result<String, FsError> {
        self.readmes
            .get(&Self::repo_key(owner, repo))
            .cloned()
            .ok_or_else(|| missing("readme"))
    }

    fn starred(&self) -> Result<Vec<Repo>, FsError> {
        let starred = self.starred_names.lock().unwrap();
        Ok(self
            .repos
            .values()
            .flatten()
            .filter(|repo| starred.contains(&repo.full_name))
            .cloned()
            .collect())
    }

    fn is_starred(&self, owner: &str, repo: &str) -> Result<bool, FsError> {
        Ok(self
            .starred_names
            .lock()
            .unwrap()
            .contains(&Self::repo_key(owner, repo)))
    }

    fn star(&self, owner: &str, repo: &str) -> Result<(), FsError> {
        self.record(format!("star {owner}/{repo}"));
        self.starred_names.lock().unwrap().insert(Self::repo_key(owner, repo));
        Ok(())
    }

    fn unstar(&self, owner: &str, repo: &str) -> Result<(), FsError> {
        self.record(format!("unstar {owner}/{repo}"));
        self.starred_names.lock().unwrap().remove(&Self::repo_key(owner, repo));
        Ok(())
    }

    fn subscription(&self, _owner: &str, _repo: &str) -> Result<Option<Subscription>, FsError> {
        Ok(None)
    }

    fn subscribe(&self, owner: &str, repo: &str, sub: Subscription) -> Result<(), FsError> {
        self.record(format!(
            "subscribe {owner}/{repo} subscribed={} ignored={}",
            sub.subscribed, sub.ignored
        ));
        Ok(())
    }

    fn unsubscribe(&self, owner: &str, repo: &str) -> Result<(), FsError> {
        self.record(format!("unsubscribe {owner}/{repo}"));
        Ok(())
    }

    fn issues(&self, owner: &str, repo: &str, filter: &IssueFilter) -> Result<Vec<Issue>, FsError> {
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        let all = self
            .issues
            .get(&Self::repo_key(owner, repo))
            .cloned()
            .unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|issue| filter.state == "all" || issue.state == filter.state)
            .filter(|issue| filter.labels.iter().all(|label| issue.labels.contains(label)))
            .collect())
    }

    fn issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, FsError> {
        self.issues
            .get(&Self::repo_key(owner, repo))
            .and_then(|issues| issues.iter().find(|i| i.number == number))
            .cloned()
            .ok_or_else(|| missing("issue"))
    }

    fn edit_issue(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        edit: &IssueEdit,
    ) -> Result<(), FsError> {
        self.record(format!(
            "edit {owner}/{repo}#{number} title={:?} state={:?} assignee={:?} labels={:?}",
            edit.title, edit.state, edit.assignee, edit.labels
        ));
        Ok(())
    }

    fn comments(&self, owner: &str, repo: &str, number: u64) -> Result<Vec<Comment>, FsError> {
        if self.fail_comments {
            return Err(FsError::Upstream("upstream returned 500".to_string()));
        }
        Ok(self
            .comments
            .get(&format!("{owner}/{repo}#{number}"))
            .cloned()
            .unwrap_or_default())
    }
}

fn fixture() -> Arc<FakeUpstream> {
    let mut upstream = FakeUpstream {
        login: Some("octo".to_string()),
        ..FakeUpstream::default()
    };

    upstream.users.insert(
        "octo".to_string(),
        Owner {
            login: "octo".to_string(),
            name: Some("Octo Cat".to_string()),
            followers: 2,
            ..Owner::default()
        },
    );
    upstream.orgs.insert(
        "werkshop".to_string(),
        Owner {
            login: "werkshop".to_string(),
            kind: OwnerKind::Organization,
            bio: Some("tools collective".to_string()),
            ..Owner::default()
        },
    );

    upstream.repos.insert(
        "octo".to_string(),
        vec![Repo {
            name: "gear".to_string(),
            full_name: "octo/gear".to_string(),
            description: Some("tooling".to_string()),
            default_branch: Some("main".to_string()),
            clone_url: Some("https://forge.example/octo/gear.git".to_string()),
            ..Repo::default()
        }],
    );
    upstream
        .readmes
        .insert("octo/gear".to_string(), "# gear\n\nspin the gear\n".to_string());

    upstream.issues.insert(
        "octo/gear".to_string(),
        vec![
            Issue {
                number: 1,
                title: "walk fails".to_string(),
                state: "open".to_string(),
                user: "octo".to_string(),
                labels: vec!["bug".to_string()],
                comments: 1,
                body: "walking the tree fails".to_string(),
                ..Issue::default()
            },
            Issue {
                number: 2,
                title: "already fixed".to_string(),
                state: "closed".to_string(),
                user: "octo".to_string(),
                labels: vec!["bug".to_string()],
                ..Issue::default()
            },
        ],
    );
    upstream.comments.insert(
        "octo/gear#1".to_string(),
        vec![Comment {
            user: "helper".to_string(),
            author_association: "CONTRIBUTOR".to_string(),
            body: "reproduced".to_string(),
            ..Comment::default()
        }],
    );

    Arc::new(upstream)
}

fn server(upstream: Arc<FakeUpstream>) -> Dispatcher {
    Dispatcher::new(seed(upstream))
}

fn read_all(d: &Dispatcher, fid: u32) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let chunk = d.rread(fid, out.len() as u64, 8192).expect("read");
        if chunk.is_empty() {
            return out;
        }
        out.extend_from_slice(&chunk);
    }
}

fn walk_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Scenario A: version negotiation accepts 9P2000 and nothing else.
#[test]
fn version_negotiation() {
    let d = server(fixture());
    let (msize, version) = d.rversion(8192, "9P2000").expect("negotiate");
    assert_eq!((msize, version.as_str()), (8192, "9P2000"));

    let err = d.rversion(8192, "9P2000.L").unwrap_err();
    assert_eq!(err.to_string(), "9P2000.L not supported; only 9P2000");
}

/// Scenario B: attach binds the root and stat describes it canonically.
#[test]
fn attach_and_root_stat() {
    let d = server(fixture());
    let qid = d.rattach(1, NOFID, "", "").expect("attach");
    assert_eq!(qid.ty, QidType::DIR);
    assert_eq!(qid.path, 0);

    let stat = d.rstat(1).expect("stat");
    assert_eq!(stat.name, "/");
    assert!(stat.mode & DMDIR != 0);
    assert_eq!(stat.qid.path, 0);
}

/// Scenario C: walk to a static file, read it, clunk, and lose the fid.
#[test]
fn static_file_lifecycle() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    let qids = d.rwalk(1, 2, &walk_names(&["0intro.md"])).expect("walk");
    assert_eq!(qids.len(), 1);
    assert_eq!(qids[0].ty, QidType::FILE);

    d.ropen(2, OpenMode::READ).expect("open");
    let text = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(text.contains("filesystem view of a source forge"));
    assert_eq!(d.rread(2, text.len() as u64, 64).expect("past end"), b"");

    d.rclunk(2).expect("clunk");
    assert!(matches!(d.rread(2, 0, 64), Err(FsError::NotFound(_))));
}

/// Scenario D: walking into /repos discovers the owner lazily, and the
/// listing shows it exactly once however often the walk repeats.
#[test]
fn lazy_owner_discovery() {
    let upstream = fixture();
    let d = server(Arc::clone(&upstream));
    d.rattach(1, NOFID, "", "").expect("attach");

    let qids = d.rwalk(1, 2, &walk_names(&["repos", "octo"])).expect("walk");
    assert_eq!(qids.len(), 2);
    assert!(qids[1].ty.is_dir());

    // Repeat the walk on fresh fids; the entry must be reused.
    let again = d.rwalk(1, 3, &walk_names(&["repos", "octo"])).expect("walk again");
    assert_eq!(again[1].path, qids[1].path);

    d.rwalk(1, 4, &walk_names(&["repos"])).expect("walk repos");
    d.ropen(4, OpenMode::READ).expect("open repos");
    let listing = read_all(&d, 4);
    let stats = Stat::parse_stream(&listing).expect("stat stream");
    let octos = stats.iter().filter(|s| s.name == "octo").count();
    assert_eq!(octos, 1);

    // Every listed qid indexes the table with matching directory bits.
    for stat in &stats {
        assert_eq!(stat.qid.ty.is_dir(), stat.mode & DMDIR != 0);
    }
}

/// Hidden names are refused without touching the upstream; the walk
/// stops short and newfid stays unbound.
#[test]
fn hidden_names_are_not_probed() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");
    let qids = d.rwalk(1, 2, &walk_names(&["repos", ".hidden"])).expect("partial");
    assert_eq!(qids.len(), 1);
    assert!(matches!(d.rstat(2), Err(FsError::NotFound(_))));
}

/// A failing first walk component is all-or-nothing; a later failure
/// returns the partial qid list and leaves newfid unbound.
#[test]
fn partial_walk_semantics() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    assert!(d.rwalk(1, 2, &walk_names(&["bogus"])).is_err());

    let qids = d
        .rwalk(1, 2, &walk_names(&["repos", "nosuchowner", "deeper"]))
        .expect("partial walk");
    assert_eq!(qids.len(), 1);
    assert!(matches!(d.rstat(2), Err(FsError::NotFound(_))));
}

/// The repository directory carries repo.md, README.md and issues.
#[test]
fn repository_tree_shape() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    d.rwalk(1, 2, &walk_names(&["repos", "octo", "gear"])).expect("walk");
    d.ropen(2, OpenMode::READ).expect("open");
    let stats = Stat::parse_stream(&read_all(&d, 2)).expect("stat stream");
    let names: HashSet<String> = stats.iter().map(|s| s.name.clone()).collect();
    for expected in ["repo.md", "README.md", "issues"] {
        assert!(names.contains(expected), "missing {expected} in {names:?}");
    }

    d.rwalk(1, 3, &walk_names(&["repos", "octo", "gear", "README.md"]))
        .expect("walk readme");
    d.ropen(3, OpenMode::READ).expect("open readme");
    let readme = String::from_utf8(read_all(&d, 3)).expect("utf8");
    assert!(readme.contains("spin the gear"));
}

/// The issues directory lists the open issue, the filter and the listing
/// file, and hides issues outside the filter.
#[test]
fn issues_directory_respects_filter() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    d.rwalk(1, 2, &walk_names(&["repos", "octo", "gear", "issues"]))
        .expect("walk issues");
    d.ropen(2, OpenMode::READ).expect("open issues");
    let stats = Stat::parse_stream(&read_all(&d, 2)).expect("stat stream");
    let names: HashSet<String> = stats.iter().map(|s| s.name.clone()).collect();
    assert!(names.contains("1.md"));
    assert!(names.contains("filter.md"));
    assert!(names.contains("0list.md"));
    assert!(!names.contains("2.md"), "closed issue listed by an open filter");
}

/// Scenario E: writing filter.md updates the options and refreshes.
#[test]
fn filter_write_round_trip() {
    let upstream = fixture();
    let d = server(Arc::clone(&upstream));
    d.rattach(1, NOFID, "", "").expect("attach");

    let path = walk_names(&["repos", "octo", "gear", "issues", "filter.md"]);
    d.rwalk(1, 2, &path).expect("walk filter");
    d.ropen(2, OpenMode::READ).expect("open filter");
    let document = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(document.contains("State = (x) open () closed () all"));
    d.rclunk(2).expect("clunk reader");

    let edited = document
        .replace("(x) open () closed", "() open (x) closed")
        .replace("Labels = ,, ___", "Labels = ,, bug ,, ___")
        .replace("Since = ", "Since = 2010-01-02T15:04:05Z");
    d.rwalk(1, 3, &path).expect("walk filter again");
    d.ropen(3, OpenMode::WRITE).expect("open for write");
    d.rwrite(3, 0, edited.as_bytes()).expect("write");
    d.rclunk(3).expect("clunk writer");

    let filter = upstream.last_filter.lock().unwrap().clone().expect("refreshed");
    assert_eq!(filter.state, "closed");
    assert_eq!(filter.labels, vec!["bug".to_string()]);
    assert_eq!(
        filter.since,
        Some("2010-01-02T15:04:05Z".parse().unwrap())
    );

    // The directory now shows the closed issue instead of the open one.
    d.rwalk(1, 4, &walk_names(&["repos", "octo", "gear", "issues"]))
        .expect("walk issues");
    d.ropen(4, OpenMode::READ).expect("open issues");
    let stats = Stat::parse_stream(&read_all(&d, 4)).expect("stat stream");
    let names: HashSet<String> = stats.iter().map(|s| s.name.clone()).collect();
    assert!(names.contains("2.md"));
    assert!(!names.contains("1.md"));
}

/// Scenario F: one writer at a time on repo.md.
#[test]
fn single_writer_enforced() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    let path = walk_names(&["repos", "octo", "gear", "repo.md"]);
    d.rwalk(1, 10, &path).expect("walk writer");
    d.rwalk(1, 11, &path).expect("walk second");

    d.ropen(10, OpenMode::WRITE).expect("first writer");
    let err = d.ropen(11, OpenMode::WRITE).unwrap_err();
    assert!(err.to_string().contains("doesn't support concurrent writes"));

    d.rclunk(10).expect("clunk first");
    d.ropen(11, OpenMode::WRITE).expect("second writer after clunk");
    d.rclunk(11).expect("clunk second");
}

/// Editing repo.md pushes only the changed fields upstream.
#[test]
fn repo_overview_edit_pushes_diffs() {
    let upstream = fixture();
    let d = server(Arc::clone(&upstream));
    d.rattach(1, NOFID, "", "").expect("attach");

    let path = walk_names(&["repos", "octo", "gear", "repo.md"]);
    d.rwalk(1, 2, &path).expect("walk");
    d.ropen(2, OpenMode::READ).expect("open read");
    let document = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(document.contains("Description = tooling___"));
    assert!(document.contains("Starred = []"));
    d.rclunk(2).expect("clunk reader");

    let edited = document
        .replace("Description = tooling___", "Description = better tooling___")
        .replace("Starred = []", "Starred = [x]")
        .replace(
            "Notifications = (x) not watching () watching () ignoring",
            "Notifications = () not watching (x) watching () ignoring",
        );

    d.rwalk(1, 3, &path).expect("walk writer");
    d.ropen(3, OpenMode::WRITE).expect("open write");
    d.rwrite(3, 0, edited.as_bytes()).expect("write");
    d.rclunk(3).expect("clunk writer");

    let mutations = upstream.mutations();
    assert!(mutations.contains(&"describe octo/gear: better tooling".to_string()));
    assert!(mutations.contains(&"star octo/gear".to_string()));
    assert!(mutations
        .contains(&"subscribe octo/gear subscribed=true ignored=false".to_string()));
}

/// An issue document renders its form, body and comments; editing the
/// state pushes an issue edit upstream.
#[test]
fn issue_document_read_and_edit() {
    let upstream = fixture();
    let d = server(Arc::clone(&upstream));
    d.rattach(1, NOFID, "", "").expect("attach");

    let path = walk_names(&["repos", "octo", "gear", "issues", "1.md"]);
    d.rwalk(1, 2, &path).expect("walk issue");
    d.ropen(2, OpenMode::READ).expect("open issue");
    let document = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(document.contains("# walk fails (#1)"));
    assert!(document.contains("State = (x) open () closed"));
    assert!(document.contains("    walking the tree fails"));
    assert!(document.contains("commented"));
    d.rclunk(2).expect("clunk reader");

    let edited = document.replace("State = (x) open () closed", "State = () open (x) closed");
    d.rwalk(1, 3, &path).expect("walk writer");
    d.ropen(3, OpenMode::WRITE).expect("open write");
    d.rwrite(3, 0, edited.as_bytes()).expect("write");
    d.rclunk(3).expect("clunk writer");

    let mutations = upstream.mutations();
    assert_eq!(mutations.len(), 1);
    assert!(mutations[0].contains("edit octo/gear#1"));
    assert!(mutations[0].contains("state=Some(\"closed\")"));
    assert!(mutations[0].contains("title=None"));
}

/// A failing comment fetch degrades to the bare issue document.
#[test]
fn comment_failures_degrade_gracefully() {
    let mut raw = FakeUpstream {
        login: None,
        fail_comments: true,
        ..FakeUpstream::default()
    };
    raw.users.insert(
        "octo".to_string(),
        Owner { login: "octo".to_string(), ..Owner::default() },
    );
    raw.repos.insert(
        "octo".to_string(),
        vec![Repo {
            name: "gear".to_string(),
            full_name: "octo/gear".to_string(),
            ..Repo::default()
        }],
    );
    raw.issues.insert(
        "octo/gear".to_string(),
        vec![Issue {
            number: 1,
            title: "walk fails".to_string(),
            state: "open".to_string(),
            ..Issue::default()
        }],
    );
    let d = server(Arc::new(raw));
    d.rattach(1, NOFID, "", "").expect("attach");

    d.rwalk(1, 2, &walk_names(&["repos", "octo", "gear", "issues", "1.md"]))
        .expect("walk issue");
    d.ropen(2, OpenMode::READ).expect("open");
    let document = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(document.contains("# walk fails (#1)"));
    assert!(!document.contains("commented"));
}

/// stars.md lists the starred repositories for the authenticated user.
#[test]
fn starred_listing() {
    let upstream = fixture();
    upstream
        .starred_names
        .lock()
        .unwrap()
        .insert("octo/gear".to_string());
    let d = server(Arc::clone(&upstream));
    d.rattach(1, NOFID, "", "").expect("attach");

    d.rwalk(1, 2, &walk_names(&["stars.md"])).expect("walk stars");
    d.ropen(2, OpenMode::READ).expect("open stars");
    let text = String::from_utf8(read_all(&d, 2)).expect("utf8");
    assert!(text.contains("* repos/octo/gear"));
}

/// stars.md is absent in anonymous mode.
#[test]
fn stars_absent_when_anonymous() {
    let mut raw = FakeUpstream::default();
    raw.users.insert(
        "octo".to_string(),
        Owner { login: "octo".to_string(), ..Owner::default() },
    );
    let d = server(Arc::new(raw));
    d.rattach(1, NOFID, "", "").expect("attach");
    assert!(d.rwalk(1, 2, &walk_names(&["stars.md"])).is_err());
}

/// Remove is refused and wstat truncates only the write buffer.
#[test]
fn remove_refused_and_wstat_truncates() {
    let d = server(fixture());
    d.rattach(1, NOFID, "", "").expect("attach");

    let path = walk_names(&["repos", "octo", "gear", "repo.md"]);
    d.rwalk(1, 2, &path).expect("walk");
    assert!(matches!(d.rremove(2), Err(FsError::NotSupported(_))));

    d.ropen(2, OpenMode::WRITE).expect("open write");
    d.rwrite(2, 0, b"scratch").expect("write");
    let mut stat = Stat::file(0);
    stat.length = 0;
    d.rwstat(2, &stat).expect("truncate");
    // An empty write buffer means clunk pushes nothing upstream.
    d.rclunk(2).expect("clunk");
}
