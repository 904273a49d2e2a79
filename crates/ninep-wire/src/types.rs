// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define 9P2000 wire types and protocol constants.
// Author: Lukas Bower

//! 9P2000 data model shared by the encoder and decoder.

use crate::stat::Stat;

/// Protocol version string negotiated by Tversion.
pub const VERSION: &str = "9P2000";

/// Largest data payload carried in a single read or write.
pub const IOUNIT: u32 = 8192;

/// Fixed overhead of a Twrite/Rread frame around its payload.
pub const IOHDRSZ: u32 = 24;

/// Maximum message size the server offers during negotiation.
pub const MAX_MSIZE: u32 = IOUNIT + IOHDRSZ;

/// Sentinel fid meaning "no fid"; the only afid accepted by attach.
pub const NOFID: u32 = !0;

/// Sentinel tag used by Tversion.
pub const NOTAG: u16 = !0;

/// Directory bit in a stat mode field.
pub const DMDIR: u32 = 0x8000_0000;

/// Errors produced while encoding or decoding 9P2000 messages.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// Input buffer was shorter than the declared frame length.
    #[error("truncated frame")]
    Truncated,
    /// Encountered an unknown or unexpected message type.
    #[error("unsupported message type {0}")]
    Unsupported(u8),
    /// Encountered malformed UTF-8 or an embedded NUL in a string field.
    #[error("invalid string field")]
    InvalidString,
    /// Declared frame size does not match the actual byte length.
    #[error("length mismatch: declared {declared} actual {actual}")]
    LengthMismatch {
        /// Size declared in the frame header.
        declared: u32,
        /// Byte length actually observed.
        actual: usize,
    },
    /// A counted field exceeds what the protocol allows.
    #[error("field too large for the wire")]
    TooLarge,
}

/// Qid type bits per the 9P2000 specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QidType(u8);

impl QidType {
    /// Directory bit.
    pub const DIR: Self = Self(0x80);
    /// Plain file.
    pub const FILE: Self = Self(0x00);

    /// Rebuild the type from its wire byte.
    #[must_use]
    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// The raw wire byte.
    #[must_use]
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Check whether the qid describes a directory.
    #[must_use]
    pub fn is_dir(self) -> bool {
        self.0 & Self::DIR.0 != 0
    }
}

impl From<QidType> for u8 {
    fn from(value: QidType) -> Self {
        value.0
    }
}

/// Server-assigned unique file identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qid {
    /// Type bits; `QidType::DIR` marks directories.
    pub ty: QidType,
    /// Version counter; always 0 in this system.
    pub version: u32,
    /// Stable 64-bit path, the entry-table index.
    pub path: u64,
}

impl Qid {
    /// Construct a directory qid with the given path.
    #[must_use]
    pub fn dir(path: u64) -> Self {
        Self { ty: QidType::DIR, version: 0, path }
    }

    /// Construct a plain-file qid with the given path.
    #[must_use]
    pub fn file(path: u64) -> Self {
        Self { ty: QidType::FILE, version: 0, path }
    }
}

/// Open mode requested by Topen/Tcreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(u8);

impl OpenMode {
    /// Read-only access.
    pub const READ: Self = Self(0);
    /// Write-only access.
    pub const WRITE: Self = Self(1);
    /// Read-write access.
    pub const RDWR: Self = Self(2);
    /// Execute access.
    pub const EXEC: Self = Self(3);
    /// Truncate bit, ORed into the base mode.
    pub const TRUNC: u8 = 0x10;

    /// Rebuild the mode from its wire byte.
    #[must_use]
    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// The raw wire byte.
    #[must_use]
    pub fn raw(self) -> u8 {
        self.0
    }

    /// Base access mode with the flag bits masked off.
    #[must_use]
    pub fn base(self) -> u8 {
        self.0 & 0x03
    }

    /// Check whether the mode requests write access.
    #[must_use]
    pub fn is_writable(self) -> bool {
        matches!(self.base(), 1 | 2)
    }

    /// Check whether the truncate bit is set.
    #[must_use]
    pub fn truncates(self) -> bool {
        self.0 & Self::TRUNC != 0
    }
}

impl From<OpenMode> for u8 {
    fn from(value: OpenMode) -> Self {
        value.0
    }
}

/// Request envelope: tag plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Per-connection request identifier echoed by the response.
    pub tag: u16,
    /// The concrete T-message payload.
    pub body: RequestBody,
}

/// Response envelope: tag plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Tag of the request this response answers.
    pub tag: u16,
    /// The concrete R-message payload.
    pub body: ResponseBody,
}

/// T-message payloads understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Tversion negotiates msize and version.
    Version {
        /// Maximum message size the client proposes.
        msize: u32,
        /// Version string the client proposes.
        version: String,
    },
    /// Tauth establishes an authentication fid; always refused here.
    Auth {
        /// Proposed authentication fid.
        afid: u32,
        /// User name.
        uname: String,
        /// Attach name.
        aname: String,
    },
    /// Tattach binds a fid to a tree root.
    Attach {
        /// Fid to bind.
        fid: u32,
        /// Authentication fid; must be `NOFID`.
        afid: u32,
        /// User name.
        uname: String,
        /// Name of the tree to attach to.
        aname: String,
    },
    /// Tflush asks the server to abort an outstanding request.
    Flush {
        /// Tag of the request to abort.
        oldtag: u16,
    },
    /// Twalk descends the tree, binding newfid to the destination.
    Walk {
        /// Source fid.
        fid: u32,
        /// Destination fid.
        newfid: u32,
        /// Path components to traverse.
        wnames: Vec<String>,
    },
    /// Topen prepares a fid for I/O.
    Open {
        /// Fid to open.
        fid: u32,
        /// Requested access mode.
        mode: OpenMode,
    },
    /// Tcreate makes a new file in the directory bound to fid.
    Create {
        /// Directory fid; rebound to the new file on success.
        fid: u32,
        /// Name of the file to create.
        name: String,
        /// Permission bits for the new file.
        perm: u32,
        /// Access mode the new file is opened with.
        mode: OpenMode,
    },
    /// Tread requests bytes from an open fid.
    Read {
        /// Fid to read from.
        fid: u32,
        /// Byte offset.
        offset: u64,
        /// Maximum byte count.
        count: u32,
    },
    /// Twrite sends bytes to an open fid.
    Write {
        /// Fid to write to.
        fid: u32,
        /// Byte offset.
        offset: u64,
        /// Payload.
        data: Vec<u8>,
    },
    /// Tclunk releases a fid.
    Clunk {
        /// Fid to release.
        fid: u32,
    },
    /// Tremove deletes the file bound to fid; always refused here.
    Remove {
        /// Fid to remove.
        fid: u32,
    },
    /// Tstat asks for the directory entry describing a fid.
    Stat {
        /// Fid to describe.
        fid: u32,
    },
    /// Twstat updates the directory entry of a fid.
    Wstat {
        /// Fid to update.
        fid: u32,
        /// Requested metadata changes.
        stat: Stat,
    },
}

/// R-message payloads emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Rversion carries the negotiated msize and version.
    Version {
        /// Negotiated maximum message size.
        msize: u32,
        /// Negotiated version string.
        version: String,
    },
    /// Rerror reports a failed request.
    Error {
        /// Human-readable reason.
        ename: String,
    },
    /// Rattach carries the root qid.
    Attach {
        /// Qid of the attached root.
        qid: Qid,
    },
    /// Rflush acknowledges a flush.
    Flush,
    /// Rwalk carries the qids of the components traversed.
    Walk {
        /// One qid per successfully walked component.
        qids: Vec<Qid>,
    },
    /// Ropen carries the opened qid and the preferred I/O size.
    Open {
        /// Qid of the opened file.
        qid: Qid,
        /// Largest read/write payload for this fid.
        iounit: u32,
    },
    /// Rcreate mirrors Ropen for a freshly created file.
    Create {
        /// Qid of the created file.
        qid: Qid,
        /// Largest read/write payload for this fid.
        iounit: u32,
    },
    /// Rread carries the bytes read.
    Read {
        /// Payload; shorter than requested at end of file.
        data: Vec<u8>,
    },
    /// Rwrite reports how many bytes were accepted.
    Write {
        /// Accepted byte count.
        count: u32,
    },
    /// Rclunk acknowledges fid release.
    Clunk,
    /// Rremove acknowledges a remove.
    Remove,
    /// Rstat carries the marshaled directory entry.
    Stat {
        /// The entry describing the fid.
        stat: Stat,
    },
    /// Rwstat acknowledges a metadata update.
    Wstat,
}
