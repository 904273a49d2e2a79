// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serve an in-memory byte buffer as a read-only file.
// Author: Lukas Bower

//! A read-only file backed by an in-memory buffer.
//!
//! The content is set at construction. Handlers that snapshot upstream
//! state compose this and replace the content on open.

use std::sync::Mutex;

use ninep_wire::Stat;

use crate::dynamic::handler::{window, FileHandler};
use crate::dynamic::tree::Fid;
use crate::error::Result;

/// Immutable-to-clients file contents, useful for introductory text and
/// rendered snapshots.
pub struct StaticFile {
    content: Mutex<Vec<u8>>,
}

impl StaticFile {
    /// Wrap the given bytes.
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self { content: Mutex::new(content.into()) }
    }

    /// Replace the snapshot; used by composing handlers on open.
    pub fn set_content(&self, content: Vec<u8>) {
        *self.content.lock().unwrap() = content;
    }

    /// Current snapshot length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.content.lock().unwrap().len() as u64
    }

    /// True when no snapshot has been taken yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.lock().unwrap().is_empty()
    }
}

impl FileHandler for StaticFile {
    fn stat(&self, _name: &str) -> Result<Stat> {
        Ok(Stat::file(self.len()))
    }

    fn read(&self, _name: &str, _fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        Ok(window(&self.content.lock().unwrap(), offset, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ninep_wire::OpenMode;

    #[test]
    fn reads_are_byte_windows() {
        let file = StaticFile::new("hello");
        assert_eq!(file.read("/f", 1, 0, 64).unwrap(), b"hello");
        assert_eq!(file.read("/f", 1, 5, 64).unwrap(), b"");
    }

    #[test]
    fn writes_are_refused() {
        let file = StaticFile::new("hello");
        assert!(file.write("/f", 1, 0, b"x").is_err());
        assert!(file.open("/f", 1, OpenMode::READ).is_ok());
    }

    #[test]
    fn stat_reports_length() {
        let file = StaticFile::new("hello");
        let stat = file.stat("/f").unwrap();
        assert_eq!(stat.length, 5);
        assert!(!stat.qid.ty.is_dir());
    }
}
