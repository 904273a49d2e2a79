// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Wire the upstream-backed handlers into the file tree.
// Author: Lukas Bower

//! Application handlers: the upstream-backed files and directories.
//!
//! Every handler follows the same shape: open (or read-from-zero)
//! snapshots the upstream object, a render routine turns it into the read
//! buffer, writes accumulate into a write buffer, and clunk of the writer
//! fid parses the buffer back and pushes changed fields upstream.

pub mod issues;
pub mod repos;

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::dynamic::{BasicDir, EntryTable, FileHandler, StaticFile};
use crate::upstream::Upstream;

/// Construction context threaded into every application handler.
#[derive(Clone)]
pub struct HandlerCtx {
    /// The shared entry table.
    pub tree: Arc<EntryTable>,
    /// The upstream forge.
    pub upstream: Arc<dyn Upstream>,
}

const INTRO: &str = "\
# forgefs

Welcome to a filesystem view of a source forge. Most of the tree is
hidden and loads on demand: the repos directory looks empty until you
walk into it. Try `cd repos/<owner>` or `cd repos/<owner>/<repo>` and
the tree fills in around you.

Files render as markdown so plain text tools work everywhere. Form
fields inside the documents can be edited and written back; saving the
file pushes the change upstream.

Issues live under repos/<owner>/<repo>/issues. Edit filter.md in that
directory to change which issues are listed.

Happy browsing!
";

/// Seed the tree with its attach-time entries: the root, the intro file,
/// the repos directory, and the starred listing when authenticated.
pub fn seed(upstream: Arc<dyn Upstream>) -> Arc<EntryTable> {
    let tree = EntryTable::new();
    tree.add("", Arc::new(BasicDir::new(Arc::clone(&tree))));
    tree.add("/0intro.md", Arc::new(StaticFile::new(INTRO)));

    let ctx = HandlerCtx { tree: Arc::clone(&tree), upstream: Arc::clone(&upstream) };
    let repos: Arc<dyn FileHandler> = Arc::new(repos::ReposHandler::new(ctx.clone()));
    tree.add("/repos", repos);

    if upstream.current_user().is_some() {
        tree.add("/stars.md", Arc::new(repos::StarsFile::new(ctx)));
    }
    tree
}

/// Indent content four spaces so user prose renders verbatim and can
/// never alias a form control line.
#[must_use]
pub(crate) fn indent(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 64);
    for line in content.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Render an optional timestamp as seconds-precision RFC3339.
#[must_use]
pub(crate) fn fmt_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "unknown".to_string(),
    }
}
