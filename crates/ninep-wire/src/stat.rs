// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Marshal and unmarshal 9P2000 directory-entry (stat) records.
// Author: Lukas Bower

//! The stat record embedded in Rstat, Twstat and directory reads.
//!
//! Wire layout: `size[2] type[2] dev[4] qid[13] mode[4] atime[4] mtime[4]
//! length[8] name[s] uid[s] gid[s] muid[s]`. The leading size does not
//! include itself.

use crate::codec::{put_string, put_u16, put_u32, put_u64, Cursor};
use crate::types::{Qid, QidType, WireError, DMDIR};

/// A 9P2000 directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Server type; unused here, kept for round-trips.
    pub ty: u16,
    /// Server subtype; unused here, kept for round-trips.
    pub dev: u32,
    /// Unique file identity.
    pub qid: Qid,
    /// Permission bits, with `DMDIR` for directories.
    pub mode: u32,
    /// Last access time, seconds since the epoch.
    pub atime: u32,
    /// Last modification time, seconds since the epoch.
    pub mtime: u32,
    /// Byte length of the file; advisory for directories.
    pub length: u64,
    /// Basename of the file; `/` for the root.
    pub name: String,
    /// Owning user.
    pub uid: String,
    /// Owning group.
    pub gid: String,
    /// User who last modified the file.
    pub muid: String,
}

impl Stat {
    /// A plain-file entry of the given length; identity fields are filled
    /// in by the dispatcher.
    #[must_use]
    pub fn file(length: u64) -> Self {
        Self {
            ty: 0,
            dev: 0,
            qid: Qid::file(0),
            mode: 0o644,
            atime: 0,
            mtime: 0,
            length,
            name: String::new(),
            uid: String::new(),
            gid: String::new(),
            muid: String::new(),
        }
    }

    /// A directory entry; length is filled in by the directory handler.
    #[must_use]
    pub fn dir() -> Self {
        Self {
            ty: 0,
            dev: 0,
            qid: Qid::dir(0),
            mode: 0o755 | DMDIR,
            atime: 0,
            mtime: 0,
            length: 0,
            name: String::new(),
            uid: String::new(),
            gid: String::new(),
            muid: String::new(),
        }
    }

    /// Serialize the record, leading size included.
    pub fn marshal(&self) -> Result<Vec<u8>, WireError> {
        let mut body = Vec::with_capacity(64);
        put_u16(&mut body, self.ty);
        put_u32(&mut body, self.dev);
        body.push(self.qid.ty.raw());
        put_u32(&mut body, self.qid.version);
        put_u64(&mut body, self.qid.path);
        put_u32(&mut body, self.mode);
        put_u32(&mut body, self.atime);
        put_u32(&mut body, self.mtime);
        put_u64(&mut body, self.length);
        put_string(&mut body, &self.name)?;
        put_string(&mut body, &self.uid)?;
        put_string(&mut body, &self.gid)?;
        put_string(&mut body, &self.muid)?;

        let size: u16 = body.len().try_into().map_err(|_| WireError::TooLarge)?;
        let mut out = Vec::with_capacity(body.len() + 2);
        put_u16(&mut out, size);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize one record from the cursor position.
    pub(crate) fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, WireError> {
        let declared = cursor.read_u16()? as usize;
        let start = cursor.consumed();

        let ty = cursor.read_u16()?;
        let dev = cursor.read_u32()?;
        let qid = Qid {
            ty: QidType::from_raw(cursor.read_u8()?),
            version: cursor.read_u32()?,
            path: cursor.read_u64()?,
        };
        let mode = cursor.read_u32()?;
        let atime = cursor.read_u32()?;
        let mtime = cursor.read_u32()?;
        let length = cursor.read_u64()?;
        let name = cursor.read_string()?;
        let uid = cursor.read_string()?;
        let gid = cursor.read_string()?;
        let muid = cursor.read_string()?;

        if cursor.consumed() - start != declared {
            return Err(WireError::LengthMismatch {
                declared: declared as u32,
                actual: cursor.consumed() - start,
            });
        }

        Ok(Self { ty, dev, qid, mode, atime, mtime, length, name, uid, gid, muid })
    }

    /// Deserialize a single record from a complete buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut cursor = Cursor::new(bytes);
        Self::unmarshal(&mut cursor)
    }

    /// Deserialize a directory-read stream of concatenated records.
    pub fn parse_stream(bytes: &[u8]) -> Result<Vec<Self>, WireError> {
        let mut cursor = Cursor::new(bytes);
        let mut out = Vec::new();
        while !cursor.is_empty() {
            out.push(Self::unmarshal(&mut cursor)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Stat {
        Stat {
            ty: 0,
            dev: 0,
            qid: Qid::dir(7),
            mode: 0o755 | DMDIR,
            atime: 0,
            mtime: 0,
            length: 42,
            name: "issues".to_string(),
            uid: "none".to_string(),
            gid: "none".to_string(),
            muid: String::new(),
        }
    }

    #[test]
    fn round_trip_single_record() {
        let stat = sample();
        let bytes = stat.marshal().expect("marshal");
        assert_eq!(Stat::from_bytes(&bytes), Ok(stat));
    }

    #[test]
    fn round_trip_stream() {
        let mut file = Stat::file(5);
        file.name = "README.md".to_string();
        let mut bytes = sample().marshal().expect("marshal dir");
        bytes.extend_from_slice(&file.marshal().expect("marshal file"));

        let parsed = Stat::parse_stream(&bytes).expect("parse stream");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "issues");
        assert_eq!(parsed[1].name, "README.md");
        assert_eq!(parsed[1].length, 5);
    }

    #[test]
    fn declared_size_must_match() {
        let mut bytes = sample().marshal().expect("marshal");
        // Inflate the declared record size past the encoded fields.
        bytes[0] = bytes[0].wrapping_add(4);
        assert!(Stat::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let bytes = sample().marshal().expect("marshal");
        assert_eq!(Stat::from_bytes(&bytes[..10]), Err(WireError::Truncated));
    }
}
