// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Implement directory semantics over entry-table scans.
// Author: Lukas Bower

//! The generic directory handler.
//!
//! A directory named `P` owns the entries whose name extends `P + "/"` by
//! exactly one component. A directory read materialises those entries as a
//! stream of marshaled stat records in table order; walking resolves one
//! component against the joined path. An optional filter predicate hides
//! children from listings without removing their entries.

use std::sync::Arc;

use ninep_wire::{Stat, DMDIR};

use crate::dynamic::handler::{basename, join, window, FileHandler};
use crate::dynamic::tree::{EntryTable, Fid};
use crate::error::{FsError, Result};

/// Predicate deciding whether a child basename appears in listings.
pub type DirFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Generic directory over the shared entry table.
pub struct BasicDir {
    tree: Arc<EntryTable>,
    filter: Option<DirFilter>,
}

impl BasicDir {
    /// Directory listing every child entry.
    #[must_use]
    pub fn new(tree: Arc<EntryTable>) -> Self {
        Self { tree, filter: None }
    }

    /// Directory whose listing is restricted by `filter`.
    #[must_use]
    pub fn with_filter(tree: Arc<EntryTable>, filter: DirFilter) -> Self {
        Self { tree, filter: Some(filter) }
    }

    /// The table this directory scans.
    #[must_use]
    pub fn tree(&self) -> &Arc<EntryTable> {
        &self.tree
    }

    fn children(&self, name: &str) -> Vec<usize> {
        let prefix = format!("{name}/");
        let depth = name.matches('/').count() + 1;
        self.tree.match_entries(|e| {
            if !e.name().starts_with(&prefix) || e.name().matches('/').count() != depth {
                return false;
            }
            match &self.filter {
                Some(filter) => filter(basename(e.name())),
                None => true,
            }
        })
    }

    /// Marshal the directory contents as a stat stream. The cheap pass
    /// with `with_length` unset is used to size the directory itself and
    /// skips per-child lengths.
    fn dir_bytes(&self, name: &str, with_length: bool) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for idx in self.children(name) {
            let entry = match self.tree.entry(idx) {
                Some(entry) => entry,
                None => continue,
            };
            let mut stat = entry.handler().stat(entry.name())?;
            stat.qid.path = idx as u64;
            stat.mode = 0o755;
            if stat.qid.ty.is_dir() {
                stat.mode |= DMDIR;
            }
            if !with_length {
                stat.length = 0;
            }
            stat.name = basename(entry.name()).to_string();
            out.extend_from_slice(&stat.marshal()?);
        }
        Ok(out)
    }
}

impl FileHandler for BasicDir {
    fn walk_child(&self, name: &str, child: &str) -> Result<usize> {
        let target = join(name, child);
        self.tree
            .match_entry(|e| e.name() == target)
            .ok_or_else(|| FsError::NotFound(child.to_string()))
    }

    fn stat(&self, name: &str) -> Result<Stat> {
        let mut stat = Stat::dir();
        stat.length = self.dir_bytes(name, false)?.len() as u64;
        Ok(stat)
    }

    fn read(&self, name: &str, _fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        let content = self.dir_bytes(name, true)?;
        Ok(window(&content, offset, count))
    }
}
