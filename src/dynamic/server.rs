// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Dispatch 9P2000 requests against the shared entry table.
// Author: Lukas Bower

//! Request dispatch and the per-connection session loop.
//!
//! [`Dispatcher`] implements the full R-message surface over the shared
//! entry table. [`Session`] owns what is per-connection: version
//! negotiation state and the in-flight tag map used by Tflush. Requests on
//! distinct tags dispatch concurrently; responses are serialised through
//! the connection's writer lock.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{error, info, warn};
use ninep_wire::{
    decode_request, encode_response, OpenMode, Qid, Request, RequestBody, Response, ResponseBody,
    Stat, DMDIR, IOHDRSZ, IOUNIT, MAX_MSIZE, NOFID, VERSION,
};

use crate::dynamic::handler::basename;
use crate::dynamic::tree::{EntryTable, Fid};
use crate::error::{FsError, Result};

/// One method per R-message. The dispatcher implements it; the debug
/// wrapper layers logging over any other implementation.
pub trait NineServer: Send + Sync {
    /// Negotiate msize and protocol version.
    fn rversion(&self, msize: u32, version: &str) -> Result<(u32, String)>;
    /// Bind a fid to a tree root.
    fn rattach(&self, fid: Fid, afid: Fid, uname: &str, aname: &str) -> Result<Qid>;
    /// Abort an outstanding request; always succeeds.
    fn rflush(&self, oldtag: u16) -> Result<()>;
    /// Walk path components, binding newfid to the destination.
    fn rwalk(&self, fid: Fid, newfid: Fid, wnames: &[String]) -> Result<Vec<Qid>>;
    /// Prepare a fid for I/O.
    fn ropen(&self, fid: Fid, mode: OpenMode) -> Result<(Qid, u32)>;
    /// Create a child in the directory bound to fid.
    fn rcreate(&self, fid: Fid, name: &str, perm: u32, mode: OpenMode) -> Result<(Qid, u32)>;
    /// Read a byte window from the entry bound to fid.
    fn rread(&self, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>>;
    /// Write bytes to the entry bound to fid.
    fn rwrite(&self, fid: Fid, offset: u64, data: &[u8]) -> Result<u32>;
    /// Release a fid. The binding is dropped even when the handler errors.
    fn rclunk(&self, fid: Fid) -> Result<()>;
    /// Remove the file bound to fid; refused to keep qid paths stable.
    fn rremove(&self, fid: Fid) -> Result<()>;
    /// Describe the entry bound to fid.
    fn rstat(&self, fid: Fid) -> Result<Stat>;
    /// Update metadata of the entry bound to fid.
    fn rwstat(&self, fid: Fid, stat: &Stat) -> Result<()>;
}

/// Shared request dispatcher over the entry table.
pub struct Dispatcher {
    tree: Arc<EntryTable>,
    iounit: u32,
}

impl Dispatcher {
    /// Build a dispatcher over a seeded tree (entry 0 must be the root).
    #[must_use]
    pub fn new(tree: Arc<EntryTable>) -> Self {
        Self { tree, iounit: IOUNIT }
    }

    /// The table this dispatcher serves.
    #[must_use]
    pub fn tree(&self) -> &Arc<EntryTable> {
        &self.tree
    }

    fn lookup(&self, fid: Fid) -> Result<(usize, Arc<crate::dynamic::tree::FileEntry>)> {
        self.tree
            .by_fid(fid)
            .ok_or_else(|| FsError::NotFound(format!("fid {fid}")))
    }

    fn require_fresh(&self, fid: Fid) -> Result<()> {
        if self.tree.by_fid(fid).is_some() {
            return Err(FsError::Protocol(format!("fid {fid} already in use")));
        }
        Ok(())
    }
}

impl NineServer for Dispatcher {
    fn rversion(&self, msize: u32, version: &str) -> Result<(u32, String)> {
        if version != VERSION {
            return Err(FsError::Protocol(format!(
                "{version} not supported; only {VERSION}"
            )));
        }
        Ok((msize.min(MAX_MSIZE), VERSION.to_string()))
    }

    fn rattach(&self, fid: Fid, afid: Fid, _uname: &str, aname: &str) -> Result<Qid> {
        if afid != NOFID {
            return Err(FsError::Protocol("auth attach is not supported".to_string()));
        }
        self.require_fresh(fid)?;
        let name = if aname == "/" { "" } else { aname };
        let (idx, entry) = self
            .tree
            .by_name(name)
            .ok_or_else(|| FsError::NotFound(aname.to_string()))?;
        entry.add_fid(fid);
        let mut stat = entry.handler().stat(entry.name())?;
        stat.qid.path = idx as u64;
        Ok(stat.qid)
    }

    fn rflush(&self, _oldtag: u16) -> Result<()> {
        Ok(())
    }

    fn rwalk(&self, fid: Fid, newfid: Fid, wnames: &[String]) -> Result<Vec<Qid>> {
        let (_, source) = self.lookup(fid)?;

        if newfid != fid {
            self.require_fresh(newfid)?;
        } else if source.is_open(fid) {
            return Err(FsError::Protocol(format!(
                "fid {fid} is open and cannot be walked onto itself"
            )));
        }

        if wnames.is_empty() {
            if newfid != fid {
                source.add_fid(newfid);
            }
            return Ok(Vec::new());
        }

        let mut current = source.clone();
        let mut qids = Vec::with_capacity(wnames.len());
        for (step, wname) in wnames.iter().enumerate() {
            let idx = match current.handler().walk_child(current.name(), wname) {
                Ok(idx) => idx,
                // The first component is all-or-nothing; afterwards a
                // partial result is returned and newfid stays unbound.
                Err(err) if step == 0 => return Err(err),
                Err(_) => return Ok(qids),
            };
            let next = self
                .tree
                .entry(idx)
                .ok_or_else(|| FsError::NotFound(wname.to_string()))?;
            let mut stat = next.handler().stat(next.name())?;
            stat.qid.path = idx as u64;
            qids.push(stat.qid);
            current = next;
        }

        if newfid == fid {
            source.remove_fid(fid);
        }
        current.add_fid(newfid);
        Ok(qids)
    }

    fn ropen(&self, fid: Fid, mode: OpenMode) -> Result<(Qid, u32)> {
        let (idx, entry) = self.lookup(fid)?;
        if entry.is_open(fid) {
            return Err(FsError::Protocol(format!("fid {fid} is already open")));
        }
        let mut stat = entry.handler().stat(entry.name())?;
        stat.qid.path = idx as u64;
        entry.handler().open(entry.name(), fid, mode)?;
        entry.mark_open(fid);
        Ok((stat.qid, self.iounit))
    }

    fn rcreate(&self, fid: Fid, name: &str, _perm: u32, mode: OpenMode) -> Result<(Qid, u32)> {
        let (_, parent) = self.lookup(fid)?;
        let idx = parent.handler().create_child(parent.name(), name)?;
        let child = self
            .tree
            .entry(idx)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;
        let mut stat = child.handler().stat(child.name())?;
        stat.qid.path = idx as u64;
        child.handler().open(child.name(), fid, mode)?;
        // The fid now refers to the created file, open for I/O.
        parent.remove_fid(fid);
        child.add_fid(fid);
        child.mark_open(fid);
        Ok((stat.qid, self.iounit))
    }

    fn rread(&self, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (_, entry) = self.lookup(fid)?;
        entry.handler().read(entry.name(), fid, offset, count)
    }

    fn rwrite(&self, fid: Fid, offset: u64, data: &[u8]) -> Result<u32> {
        let (_, entry) = self.lookup(fid)?;
        entry.handler().write(entry.name(), fid, offset, data)
    }

    fn rclunk(&self, fid: Fid) -> Result<()> {
        let (_, entry) = self.lookup(fid)?;
        // The binding is released first so the fid dies even when the
        // handler's flush-on-clunk fails; the error still reaches the
        // client.
        entry.remove_fid(fid);
        entry.handler().clunk(entry.name(), fid)
    }

    fn rremove(&self, fid: Fid) -> Result<()> {
        let _ = self.lookup(fid)?;
        // Entry indices are qid paths; removal would let them be reused.
        Err(FsError::NotSupported("remove"))
    }

    fn rstat(&self, fid: Fid) -> Result<Stat> {
        let (idx, entry) = self.lookup(fid)?;
        let mut stat = entry.handler().stat(entry.name())?;
        stat.qid.path = idx as u64;
        stat.mode = 0o755;
        if stat.qid.ty.is_dir() {
            stat.mode |= DMDIR;
        }
        stat.name = basename(entry.name()).to_string();
        stat.uid = "none".to_string();
        stat.gid = "none".to_string();
        Ok(stat)
    }

    fn rwstat(&self, fid: Fid, stat: &Stat) -> Result<()> {
        let (_, entry) = self.lookup(fid)?;
        entry.handler().wstat(entry.name(), stat)
    }
}

/// Per-connection session: negotiation state, tag tracking, frame loop.
pub struct Session {
    server: Arc<dyn NineServer>,
    msize: AtomicU32,
    versioned: AtomicBool,
    tags: Mutex<HashMap<u16, Arc<AtomicBool>>>,
}

impl Session {
    /// Wrap a dispatcher (or its debug wrapper) for one connection.
    #[must_use]
    pub fn new(server: Arc<dyn NineServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            msize: AtomicU32::new(MAX_MSIZE),
            versioned: AtomicBool::new(false),
            tags: Mutex::new(HashMap::new()),
        })
    }

    /// Drive the connection until EOF or a framing failure.
    pub fn run(self: Arc<Self>, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string());
        info!("connection from {peer}");

        let mut reader = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                error!("{peer}: cannot clone stream: {err}");
                return;
            }
        };
        let writer = Arc::new(Mutex::new(stream));

        loop {
            let frame = match read_frame(&mut reader, self.msize.load(Ordering::SeqCst)) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    // Framing is corrupt; the stream cannot be resynced.
                    error!("{peer}: framing error: {err}");
                    break;
                }
            };

            let request = match decode_request(&frame) {
                Ok(request) => request,
                Err(err) => {
                    error!("{peer}: undecodable message: {err}");
                    break;
                }
            };

            Arc::clone(&self).handle(request, &writer);
        }

        info!("connection from {peer} closed");
    }

    fn handle(self: Arc<Self>, request: Request, writer: &Arc<Mutex<TcpStream>>) {
        let tag = request.tag;
        match request.body {
            // Version and flush are answered serially on the read loop;
            // everything else dispatches on its own thread.
            RequestBody::Version { msize, version } => {
                let body = match self.server.rversion(msize, &version) {
                    Ok((msize, version)) => {
                        self.msize.store(msize, Ordering::SeqCst);
                        self.versioned.store(true, Ordering::SeqCst);
                        ResponseBody::Version { msize, version }
                    }
                    Err(err) => ResponseBody::Error { ename: err.ename() },
                };
                write_response(writer, Response { tag, body });
            }
            RequestBody::Flush { oldtag } => {
                if let Some(flag) = self.tags.lock().unwrap().remove(&oldtag) {
                    flag.store(true, Ordering::SeqCst);
                }
                let body = match self.server.rflush(oldtag) {
                    Ok(()) => ResponseBody::Flush,
                    Err(err) => ResponseBody::Error { ename: err.ename() },
                };
                write_response(writer, Response { tag, body });
            }
            body => {
                if !self.versioned.load(Ordering::SeqCst) {
                    let ename = FsError::Protocol("version negotiation required".to_string());
                    write_response(
                        writer,
                        Response { tag, body: ResponseBody::Error { ename: ename.ename() } },
                    );
                    return;
                }

                let cancel = Arc::new(AtomicBool::new(false));
                {
                    let mut tags = self.tags.lock().unwrap();
                    if tags.contains_key(&tag) {
                        drop(tags);
                        let err = FsError::Protocol(format!("tag {tag} already in flight"));
                        write_response(
                            writer,
                            Response { tag, body: ResponseBody::Error { ename: err.ename() } },
                        );
                        return;
                    }
                    tags.insert(tag, Arc::clone(&cancel));
                }

                let writer = Arc::clone(writer);
                thread::spawn(move || {
                    let body = self.dispatch(body);
                    self.tags.lock().unwrap().remove(&tag);
                    if cancel.load(Ordering::SeqCst) {
                        // Flushed while in flight; the response is dropped.
                        return;
                    }
                    write_response(&writer, Response { tag, body });
                });
            }
        }
    }

    fn dispatch(&self, body: RequestBody) -> ResponseBody {
        let result = match body {
            RequestBody::Auth { .. } => {
                Err(FsError::Protocol("authentication is not required".to_string()))
            }
            RequestBody::Attach { fid, afid, uname, aname } => self
                .server
                .rattach(fid, afid, &uname, &aname)
                .map(|qid| ResponseBody::Attach { qid }),
            RequestBody::Walk { fid, newfid, wnames } => self
                .server
                .rwalk(fid, newfid, &wnames)
                .map(|qids| ResponseBody::Walk { qids }),
            RequestBody::Open { fid, mode } => self
                .server
                .ropen(fid, mode)
                .map(|(qid, iounit)| ResponseBody::Open { qid, iounit }),
            RequestBody::Create { fid, name, perm, mode } => self
                .server
                .rcreate(fid, &name, perm, mode)
                .map(|(qid, iounit)| ResponseBody::Create { qid, iounit }),
            RequestBody::Read { fid, offset, count } => {
                let limit = self.msize.load(Ordering::SeqCst).saturating_sub(IOHDRSZ);
                self.server
                    .rread(fid, offset, count.min(limit))
                    .map(|data| ResponseBody::Read { data })
            }
            RequestBody::Write { fid, offset, data } => self
                .server
                .rwrite(fid, offset, &data)
                .map(|count| ResponseBody::Write { count }),
            RequestBody::Clunk { fid } => self.server.rclunk(fid).map(|()| ResponseBody::Clunk),
            RequestBody::Remove { fid } => self.server.rremove(fid).map(|()| ResponseBody::Remove),
            RequestBody::Stat { fid } => {
                self.server.rstat(fid).map(|stat| ResponseBody::Stat { stat })
            }
            RequestBody::Wstat { fid, stat } => {
                self.server.rwstat(fid, &stat).map(|()| ResponseBody::Wstat)
            }
            RequestBody::Version { .. } | RequestBody::Flush { .. } => {
                Err(FsError::Protocol("message handled on the read loop".to_string()))
            }
        };

        match result {
            Ok(body) => body,
            Err(err) => ResponseBody::Error { ename: err.ename() },
        }
    }
}

/// Read one frame; `Ok(None)` at clean EOF.
fn read_frame(reader: &mut impl Read, msize: u32) -> std::io::Result<Option<Vec<u8>>> {
    let mut size = [0u8; 4];
    match reader.read_exact(&mut size) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let size = u32::from_le_bytes(size);
    if size < 7 || size > msize.max(MAX_MSIZE) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame size {size} out of range"),
        ));
    }
    let mut frame = vec![0u8; size as usize];
    frame[..4].copy_from_slice(&size.to_le_bytes());
    reader.read_exact(&mut frame[4..])?;
    Ok(Some(frame))
}

fn write_response(writer: &Arc<Mutex<TcpStream>>, response: Response) {
    let frame = match encode_response(&response) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("unencodable response for tag {}: {err}", response.tag);
            let fallback = Response {
                tag: response.tag,
                body: ResponseBody::Error { ename: err.to_string() },
            };
            match encode_response(&fallback) {
                Ok(frame) => frame,
                Err(_) => return,
            }
        }
    };
    let mut stream = writer.lock().unwrap();
    if let Err(err) = stream.write_all(&frame).and_then(|()| stream.flush()) {
        warn!("write failed: {err}");
    }
}

/// Accept connections forever, one session thread per client.
pub fn serve(listener: TcpListener, server: Arc<dyn NineServer>) -> std::io::Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let session = Session::new(Arc::clone(&server));
                thread::spawn(move || session.run(stream));
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
    Ok(())
}
