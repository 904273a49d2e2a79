// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the polymorphic file-handler contract and path helpers.
// Author: Lukas Bower

//! The handler contract every file entry plugs into.
//!
//! Handlers are stateless with respect to which entry they back: every
//! operation receives the entry's absolute slash-separated name. Per-fid
//! scratch state (write buffers, the writer fid) lives inside the handler
//! and is torn down on clunk.

use ninep_wire::{OpenMode, Stat};

use crate::dynamic::tree::Fid;
use crate::error::{FsError, Result};

/// Behaviour of one or more file entries.
///
/// Defaults give plain-file semantics: no children, no creation, no
/// removal, no metadata updates. Directories override `walk_child`;
/// writable handlers override `open`, `write`, `wstat` and `clunk`.
pub trait FileHandler: Send + Sync {
    /// Resolve the child named `child` under the entry `name`, creating it
    /// on the fly when the handler supports dynamic discovery. Returns the
    /// child's entry index. Must be idempotent.
    fn walk_child(&self, name: &str, child: &str) -> Result<usize> {
        let _ = name;
        Err(FsError::NotFound(child.to_string()))
    }

    /// Reserve per-fid resources. Writable modes may fail with `Busy` when
    /// the handler permits a single writer.
    fn open(&self, name: &str, fid: Fid, mode: OpenMode) -> Result<()> {
        let _ = (name, fid, mode);
        Ok(())
    }

    /// Create a new child entry and return its index.
    fn create_child(&self, name: &str, child: &str) -> Result<usize> {
        let _ = (name, child);
        Err(FsError::NotSupported("creation"))
    }

    /// Describe the file. The dispatcher overwrites the qid path and the
    /// name with their canonical values before replying.
    fn stat(&self, name: &str) -> Result<Stat>;

    /// Apply metadata changes. Handlers with a write buffer accept length
    /// truncation; everything else refuses.
    fn wstat(&self, name: &str, stat: &Stat) -> Result<()> {
        let _ = (name, stat);
        Err(FsError::NotSupported("wstat"))
    }

    /// Remove the entry. Always refused in this system: entry indices are
    /// QID paths and must never be reused.
    fn remove(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(FsError::NotSupported("remove"))
    }

    /// Return up to `count` bytes starting at `offset` from the current
    /// snapshot. A read of count > 0 at offset 0 triggers lazy refresh in
    /// upstream-backed handlers.
    fn read(&self, name: &str, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>>;

    /// Accept bytes from the writer fid. Writes from any other fid are
    /// discarded but reported as fully consumed.
    fn write(&self, name: &str, fid: Fid, offset: u64, data: &[u8]) -> Result<u32> {
        let _ = (name, fid, offset, data);
        Err(FsError::NotSupported("write"))
    }

    /// Tear down per-fid state. The writer fid parses its accumulated
    /// buffer and pushes the edit upstream; errors propagate to the client.
    fn clunk(&self, name: &str, fid: Fid) -> Result<()> {
        let _ = (name, fid);
        Ok(())
    }
}

/// Join an absolute entry name with one walk component.
///
/// The root is the empty name. `.` stays put and `..` pops one component,
/// never escaping the root.
#[must_use]
pub fn join(name: &str, child: &str) -> String {
    match child {
        "." => name.to_string(),
        ".." => parent(name),
        _ => format!("{name}/{child}"),
    }
}

/// Parent of an absolute entry name; the root is its own parent.
#[must_use]
pub fn parent(name: &str) -> String {
    match name.rfind('/') {
        Some(idx) => name[..idx].to_string(),
        None => String::new(),
    }
}

/// Final component of an absolute entry name, `/` for the root.
#[must_use]
pub fn basename(name: &str) -> &str {
    match name.rfind('/') {
        Some(idx) => &name[idx + 1..],
        None => "/",
    }
}

/// Slice a snapshot buffer to the requested byte window. Reads past the
/// end return empty rather than an error.
#[must_use]
pub fn window(content: &[u8], offset: u64, count: u32) -> Vec<u8> {
    let len = content.len() as u64;
    if offset >= len {
        return Vec::new();
    }
    let end = (offset + count as u64).min(len) as usize;
    content[offset as usize..end].to_vec()
}
