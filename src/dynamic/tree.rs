// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Maintain the append-only entry table backing the file tree.
// Author: Lukas Bower

//! The entry table: the canonical backing store for the file tree.
//!
//! Entries are only ever appended; an entry's index doubles as its QID
//! path, so indices stay valid for the process lifetime. One mutex guards
//! the table's append and scan; each entry guards its own fid set. Lock
//! order is table, then entry, then handler, and the table lock is never
//! held across an upstream call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::dynamic::handler::FileHandler;

/// Client-chosen 32-bit file handle.
pub type Fid = u32;

/// A location in the tree together with the handler that backs it.
pub struct FileEntry {
    name: String,
    handler: Arc<dyn FileHandler>,
    fids: Mutex<HashMap<Fid, bool>>,
}

impl FileEntry {
    fn new(name: &str, handler: Arc<dyn FileHandler>) -> Self {
        Self {
            name: name.to_string(),
            handler,
            fids: Mutex::new(HashMap::new()),
        }
    }

    /// Absolute slash-separated name; the root is the empty string.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler backing this entry.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn FileHandler> {
        &self.handler
    }

    /// Bind a fid to this entry.
    pub fn add_fid(&self, fid: Fid) {
        self.fids.lock().unwrap().insert(fid, false);
    }

    /// Release a fid binding; no-op when absent.
    pub fn remove_fid(&self, fid: Fid) {
        self.fids.lock().unwrap().remove(&fid);
    }

    /// Check whether a fid is bound to this entry.
    #[must_use]
    pub fn has_fid(&self, fid: Fid) -> bool {
        self.fids.lock().unwrap().contains_key(&fid)
    }

    /// Record that a bound fid has been opened.
    pub fn mark_open(&self, fid: Fid) {
        if let Some(opened) = self.fids.lock().unwrap().get_mut(&fid) {
            *opened = true;
        }
    }

    /// Check whether a bound fid has been opened.
    #[must_use]
    pub fn is_open(&self, fid: Fid) -> bool {
        *self.fids.lock().unwrap().get(&fid).unwrap_or(&false)
    }
}

/// Append-only registry of file entries, shared by every connection.
pub struct EntryTable {
    entries: Mutex<Vec<Arc<FileEntry>>>,
}

impl EntryTable {
    /// Create an empty table. The caller seeds the root at index 0.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: Mutex::new(Vec::new()) })
    }

    /// Append an entry, returning its index. Adding a name that already
    /// exists returns the existing index so QID paths stay stable.
    pub fn add(&self, name: &str, handler: Arc<dyn FileHandler>) -> usize {
        let mut entries = self.entries.lock().unwrap();
        if let Some(idx) = entries.iter().position(|e| e.name == name) {
            return idx;
        }
        entries.push(Arc::new(FileEntry::new(name, handler)));
        entries.len() - 1
    }

    /// Fetch the entry at `idx`.
    #[must_use]
    pub fn entry(&self, idx: usize) -> Option<Arc<FileEntry>> {
        self.entries.lock().unwrap().get(idx).cloned()
    }

    /// Index of the first entry matching the predicate.
    pub fn match_entry(&self, matcher: impl Fn(&FileEntry) -> bool) -> Option<usize> {
        self.entries.lock().unwrap().iter().position(|e| matcher(e))
    }

    /// Indices of every entry matching the predicate, in table order.
    pub fn match_entries(&self, matcher: impl Fn(&FileEntry) -> bool) -> Vec<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| matcher(e))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Locate the entry a fid is bound to.
    #[must_use]
    pub fn by_fid(&self, fid: Fid) -> Option<(usize, Arc<FileEntry>)> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.has_fid(fid))
            .map(|(idx, e)| (idx, Arc::clone(e)))
    }

    /// Locate an entry by exact name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<(usize, Arc<FileEntry>)> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.name == name)
            .map(|(idx, e)| (idx, Arc::clone(e)))
    }

    /// Check whether any entry lies beneath `name`.
    #[must_use]
    pub fn has_children(&self, name: &str) -> bool {
        let prefix = format!("{name}/");
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.name.starts_with(&prefix))
    }

    /// Number of entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True when the table has not been seeded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
