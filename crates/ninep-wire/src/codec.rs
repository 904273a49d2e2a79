// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000 wire frames.
// Author: Lukas Bower

//! Encode/decode helpers for 9P2000 frames.
//!
//! Every frame is `size[4] type[1] tag[2] body`, little-endian, with the
//! size covering the whole frame including itself.

use std::str;

use crate::stat::Stat;
use crate::types::*;

/// Maximum path components in a single walk, per the protocol.
const MAXWELEM: usize = 16;

/// 9P2000 message opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
    Tstat = 124,
    Rstat = 125,
    Twstat = 126,
    Rwstat = 127,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            102 => Tauth,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            124 => Tstat,
            125 => Rstat,
            126 => Twstat,
            127 => Rwstat,
            other => return Err(WireError::Unsupported(other)),
        })
    }
}

/// Encode a request into its wire representation.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    put_u16(&mut payload, request.tag);
    let ty = match &request.body {
        RequestBody::Version { msize, version } => {
            put_u32(&mut payload, *msize);
            put_string(&mut payload, version)?;
            MessageType::Tversion
        }
        RequestBody::Auth { afid, uname, aname } => {
            put_u32(&mut payload, *afid);
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
            MessageType::Tauth
        }
        RequestBody::Attach { fid, afid, uname, aname } => {
            put_u32(&mut payload, *fid);
            put_u32(&mut payload, *afid);
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
            MessageType::Tattach
        }
        RequestBody::Flush { oldtag } => {
            put_u16(&mut payload, *oldtag);
            MessageType::Tflush
        }
        RequestBody::Walk { fid, newfid, wnames } => {
            put_u32(&mut payload, *fid);
            put_u32(&mut payload, *newfid);
            if wnames.len() > MAXWELEM {
                return Err(WireError::TooLarge);
            }
            put_u16(&mut payload, wnames.len() as u16);
            for name in wnames {
                validate_component(name)?;
                put_string(&mut payload, name)?;
            }
            MessageType::Twalk
        }
        RequestBody::Open { fid, mode } => {
            put_u32(&mut payload, *fid);
            payload.push(mode.raw());
            MessageType::Topen
        }
        RequestBody::Create { fid, name, perm, mode } => {
            put_u32(&mut payload, *fid);
            put_string(&mut payload, name)?;
            put_u32(&mut payload, *perm);
            payload.push(mode.raw());
            MessageType::Tcreate
        }
        RequestBody::Read { fid, offset, count } => {
            put_u32(&mut payload, *fid);
            put_u64(&mut payload, *offset);
            put_u32(&mut payload, *count);
            MessageType::Tread
        }
        RequestBody::Write { fid, offset, data } => {
            put_u32(&mut payload, *fid);
            put_u64(&mut payload, *offset);
            let count: u32 = data.len().try_into().map_err(|_| WireError::TooLarge)?;
            put_u32(&mut payload, count);
            payload.extend_from_slice(data);
            MessageType::Twrite
        }
        RequestBody::Clunk { fid } => {
            put_u32(&mut payload, *fid);
            MessageType::Tclunk
        }
        RequestBody::Remove { fid } => {
            put_u32(&mut payload, *fid);
            MessageType::Tremove
        }
        RequestBody::Stat { fid } => {
            put_u32(&mut payload, *fid);
            MessageType::Tstat
        }
        RequestBody::Wstat { fid, stat } => {
            put_u32(&mut payload, *fid);
            let bytes = stat.marshal()?;
            let size: u16 = bytes.len().try_into().map_err(|_| WireError::TooLarge)?;
            put_u16(&mut payload, size);
            payload.extend_from_slice(&bytes);
            MessageType::Twstat
        }
    };
    Ok(finish(ty, &payload))
}

/// Encode a response into its wire representation.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    put_u16(&mut payload, response.tag);
    let ty = match &response.body {
        ResponseBody::Version { msize, version } => {
            put_u32(&mut payload, *msize);
            put_string(&mut payload, version)?;
            MessageType::Rversion
        }
        ResponseBody::Error { ename } => {
            put_string(&mut payload, ename)?;
            MessageType::Rerror
        }
        ResponseBody::Attach { qid } => {
            put_qid(&mut payload, qid);
            MessageType::Rattach
        }
        ResponseBody::Flush => MessageType::Rflush,
        ResponseBody::Walk { qids } => {
            if qids.len() > MAXWELEM {
                return Err(WireError::TooLarge);
            }
            put_u16(&mut payload, qids.len() as u16);
            for qid in qids {
                put_qid(&mut payload, qid);
            }
            MessageType::Rwalk
        }
        ResponseBody::Open { qid, iounit } => {
            put_qid(&mut payload, qid);
            put_u32(&mut payload, *iounit);
            MessageType::Ropen
        }
        ResponseBody::Create { qid, iounit } => {
            put_qid(&mut payload, qid);
            put_u32(&mut payload, *iounit);
            MessageType::Rcreate
        }
        ResponseBody::Read { data } => {
            let count: u32 = data.len().try_into().map_err(|_| WireError::TooLarge)?;
            put_u32(&mut payload, count);
            payload.extend_from_slice(data);
            MessageType::Rread
        }
        ResponseBody::Write { count } => {
            put_u32(&mut payload, *count);
            MessageType::Rwrite
        }
        ResponseBody::Clunk => MessageType::Rclunk,
        ResponseBody::Remove => MessageType::Rremove,
        ResponseBody::Stat { stat } => {
            let bytes = stat.marshal()?;
            let size: u16 = bytes.len().try_into().map_err(|_| WireError::TooLarge)?;
            put_u16(&mut payload, size);
            payload.extend_from_slice(&bytes);
            MessageType::Rstat
        }
        ResponseBody::Wstat => MessageType::Rwstat,
    };
    Ok(finish(ty, &payload))
}

/// Decode a request from a complete frame.
pub fn decode_request(bytes: &[u8]) -> Result<Request, WireError> {
    let (ty, payload) = split_frame(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.read_u16()?;
    let body = match ty {
        MessageType::Tversion => RequestBody::Version {
            msize: cursor.read_u32()?,
            version: cursor.read_string()?,
        },
        MessageType::Tauth => RequestBody::Auth {
            afid: cursor.read_u32()?,
            uname: cursor.read_string()?,
            aname: cursor.read_string()?,
        },
        MessageType::Tattach => RequestBody::Attach {
            fid: cursor.read_u32()?,
            afid: cursor.read_u32()?,
            uname: cursor.read_string()?,
            aname: cursor.read_string()?,
        },
        MessageType::Tflush => RequestBody::Flush { oldtag: cursor.read_u16()? },
        MessageType::Twalk => {
            let fid = cursor.read_u32()?;
            let newfid = cursor.read_u32()?;
            let nwname = cursor.read_u16()? as usize;
            if nwname > MAXWELEM {
                return Err(WireError::TooLarge);
            }
            let mut wnames = Vec::with_capacity(nwname);
            for _ in 0..nwname {
                let name = cursor.read_string()?;
                validate_component(&name)?;
                wnames.push(name);
            }
            RequestBody::Walk { fid, newfid, wnames }
        }
        MessageType::Topen => RequestBody::Open {
            fid: cursor.read_u32()?,
            mode: OpenMode::from_raw(cursor.read_u8()?),
        },
        MessageType::Tcreate => RequestBody::Create {
            fid: cursor.read_u32()?,
            name: cursor.read_string()?,
            perm: cursor.read_u32()?,
            mode: OpenMode::from_raw(cursor.read_u8()?),
        },
        MessageType::Tread => RequestBody::Read {
            fid: cursor.read_u32()?,
            offset: cursor.read_u64()?,
            count: cursor.read_u32()?,
        },
        MessageType::Twrite => {
            let fid = cursor.read_u32()?;
            let offset = cursor.read_u64()?;
            let count = cursor.read_u32()? as usize;
            RequestBody::Write { fid, offset, data: cursor.read_bytes(count)? }
        }
        MessageType::Tclunk => RequestBody::Clunk { fid: cursor.read_u32()? },
        MessageType::Tremove => RequestBody::Remove { fid: cursor.read_u32()? },
        MessageType::Tstat => RequestBody::Stat { fid: cursor.read_u32()? },
        MessageType::Twstat => {
            let fid = cursor.read_u32()?;
            let size = cursor.read_u16()? as usize;
            let bytes = cursor.read_bytes(size)?;
            RequestBody::Wstat { fid, stat: Stat::from_bytes(&bytes)? }
        }
        other => return Err(WireError::Unsupported(other as u8)),
    };
    Ok(Request { tag, body })
}

/// Decode a response from a complete frame.
pub fn decode_response(bytes: &[u8]) -> Result<Response, WireError> {
    let (ty, payload) = split_frame(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.read_u16()?;
    let body = match ty {
        MessageType::Rversion => ResponseBody::Version {
            msize: cursor.read_u32()?,
            version: cursor.read_string()?,
        },
        MessageType::Rerror => ResponseBody::Error { ename: cursor.read_string()? },
        MessageType::Rattach => ResponseBody::Attach { qid: read_qid(&mut cursor)? },
        MessageType::Rflush => ResponseBody::Flush,
        MessageType::Rwalk => {
            let count = cursor.read_u16()? as usize;
            if count > MAXWELEM {
                return Err(WireError::TooLarge);
            }
            let mut qids = Vec::with_capacity(count);
            for _ in 0..count {
                qids.push(read_qid(&mut cursor)?);
            }
            ResponseBody::Walk { qids }
        }
        MessageType::Ropen => ResponseBody::Open {
            qid: read_qid(&mut cursor)?,
            iounit: cursor.read_u32()?,
        },
        MessageType::Rcreate => ResponseBody::Create {
            qid: read_qid(&mut cursor)?,
            iounit: cursor.read_u32()?,
        },
        MessageType::Rread => {
            let count = cursor.read_u32()? as usize;
            ResponseBody::Read { data: cursor.read_bytes(count)? }
        }
        MessageType::Rwrite => ResponseBody::Write { count: cursor.read_u32()? },
        MessageType::Rclunk => ResponseBody::Clunk,
        MessageType::Rremove => ResponseBody::Remove,
        MessageType::Rstat => {
            let size = cursor.read_u16()? as usize;
            let bytes = cursor.read_bytes(size)?;
            ResponseBody::Stat { stat: Stat::from_bytes(&bytes)? }
        }
        MessageType::Rwstat => ResponseBody::Wstat,
        other => return Err(WireError::Unsupported(other as u8)),
    };
    Ok(Response { tag, body })
}

fn finish(ty: MessageType, payload: &[u8]) -> Vec<u8> {
    let size = payload.len() + 5;
    let mut buffer = Vec::with_capacity(size);
    buffer.extend_from_slice(&(size as u32).to_le_bytes());
    buffer.push(ty as u8);
    buffer.extend_from_slice(payload);
    buffer
}

fn split_frame(bytes: &[u8]) -> Result<(MessageType, &[u8]), WireError> {
    if bytes.len() < 7 {
        return Err(WireError::Truncated);
    }
    let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if declared as usize != bytes.len() {
        return Err(WireError::LengthMismatch { declared, actual: bytes.len() });
    }
    let ty = MessageType::try_from(bytes[4])?;
    Ok((ty, &bytes[5..]))
}

fn validate_component(component: &str) -> Result<(), WireError> {
    if component.is_empty() || component.contains('/') {
        return Err(WireError::InvalidString);
    }
    Ok(())
}

fn read_qid(cursor: &mut Cursor<'_>) -> Result<Qid, WireError> {
    Ok(Qid {
        ty: QidType::from_raw(cursor.read_u8()?),
        version: cursor.read_u32()?,
        path: cursor.read_u64()?,
    })
}

fn put_qid(buffer: &mut Vec<u8>, qid: &Qid) {
    buffer.push(qid.ty.raw());
    put_u32(buffer, qid.version);
    put_u64(buffer, qid.path);
}

pub(crate) fn put_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_string(buffer: &mut Vec<u8>, value: &str) -> Result<(), WireError> {
    if value.contains('\0') {
        return Err(WireError::InvalidString);
    }
    let len: u16 = value.len().try_into().map_err(|_| WireError::TooLarge)?;
    put_u16(buffer, len);
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Byte-slice reader used by the decoder and the stat parser.
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn consumed(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        if end > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, WireError> {
        Ok(self.take(len)?.to_vec())
    }

    pub(crate) fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        let text = str::from_utf8(bytes).map_err(|_| WireError::InvalidString)?;
        if text.contains('\0') {
            return Err(WireError::InvalidString);
        }
        Ok(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_request(body: RequestBody) {
        let request = Request { tag: 17, body };
        let frame = encode_request(&request).expect("encode");
        assert_eq!(decode_request(&frame), Ok(request));
    }

    fn round_trip_response(body: ResponseBody) {
        let response = Response { tag: 17, body };
        let frame = encode_response(&response).expect("encode");
        assert_eq!(decode_response(&frame), Ok(response));
    }

    #[test]
    fn round_trip_every_request() {
        round_trip_request(RequestBody::Version { msize: 8216, version: VERSION.to_string() });
        round_trip_request(RequestBody::Auth {
            afid: 9,
            uname: "glenda".to_string(),
            aname: String::new(),
        });
        round_trip_request(RequestBody::Attach {
            fid: 1,
            afid: NOFID,
            uname: "glenda".to_string(),
            aname: "/".to_string(),
        });
        round_trip_request(RequestBody::Flush { oldtag: 3 });
        round_trip_request(RequestBody::Walk {
            fid: 1,
            newfid: 2,
            wnames: vec!["repos".to_string(), "octo".to_string()],
        });
        round_trip_request(RequestBody::Open { fid: 2, mode: OpenMode::READ });
        round_trip_request(RequestBody::Create {
            fid: 2,
            name: "notes.md".to_string(),
            perm: 0o644,
            mode: OpenMode::WRITE,
        });
        round_trip_request(RequestBody::Read { fid: 2, offset: 64, count: 8192 });
        round_trip_request(RequestBody::Write { fid: 2, offset: 0, data: b"hello".to_vec() });
        round_trip_request(RequestBody::Clunk { fid: 2 });
        round_trip_request(RequestBody::Remove { fid: 2 });
        round_trip_request(RequestBody::Stat { fid: 2 });
        let mut stat = Stat::file(11);
        stat.name = "repo.md".to_string();
        round_trip_request(RequestBody::Wstat { fid: 2, stat });
    }

    #[test]
    fn round_trip_every_response() {
        round_trip_response(ResponseBody::Version { msize: 8216, version: VERSION.to_string() });
        round_trip_response(ResponseBody::Error { ename: "file not found".to_string() });
        round_trip_response(ResponseBody::Attach { qid: Qid::dir(0) });
        round_trip_response(ResponseBody::Flush);
        round_trip_response(ResponseBody::Walk { qids: vec![Qid::dir(1), Qid::file(4)] });
        round_trip_response(ResponseBody::Open { qid: Qid::file(4), iounit: IOUNIT });
        round_trip_response(ResponseBody::Create { qid: Qid::file(5), iounit: IOUNIT });
        round_trip_response(ResponseBody::Read { data: b"# hello\n".to_vec() });
        round_trip_response(ResponseBody::Write { count: 8 });
        round_trip_response(ResponseBody::Clunk);
        round_trip_response(ResponseBody::Remove);
        let mut stat = Stat::dir();
        stat.name = "/".to_string();
        round_trip_response(ResponseBody::Stat { stat });
        round_trip_response(ResponseBody::Wstat);
    }

    #[test]
    fn reject_slash_in_walk_component() {
        let request = Request {
            tag: 1,
            body: RequestBody::Walk {
                fid: 1,
                newfid: 2,
                wnames: vec!["a/b".to_string()],
            },
        };
        assert_eq!(encode_request(&request), Err(WireError::InvalidString));
    }

    #[test]
    fn reject_truncated_frame() {
        let frame = encode_request(&Request {
            tag: 1,
            body: RequestBody::Clunk { fid: 7 },
        })
        .expect("encode");
        assert_eq!(decode_request(&frame[..3]), Err(WireError::Truncated));
    }

    #[test]
    fn reject_length_mismatch() {
        let mut frame = encode_request(&Request {
            tag: 1,
            body: RequestBody::Clunk { fid: 7 },
        })
        .expect("encode");
        frame[0] = frame[0].wrapping_add(1);
        assert!(matches!(
            decode_request(&frame),
            Err(WireError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn reject_unknown_type() {
        let mut frame = encode_request(&Request {
            tag: 1,
            body: RequestBody::Clunk { fid: 7 },
        })
        .expect("encode");
        frame[4] = 250;
        assert_eq!(decode_request(&frame), Err(WireError::Unsupported(250)));
    }

    #[test]
    fn reject_invalid_utf8_string() {
        let mut frame = encode_response(&Response {
            tag: 1,
            body: ResponseBody::Error { ename: "boom".to_string() },
        })
        .expect("encode");
        let len = frame.len();
        frame[len - 1] = 0xff;
        assert_eq!(decode_response(&frame), Err(WireError::InvalidString));
    }

    #[test]
    fn reject_embedded_nul() {
        let response = Response {
            tag: 1,
            body: ResponseBody::Error { ename: "bad\0name".to_string() },
        };
        assert_eq!(encode_response(&response), Err(WireError::InvalidString));
    }
}
