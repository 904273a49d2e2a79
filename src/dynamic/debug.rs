// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Log every T/R pair around an inner dispatcher.
// Author: Lukas Bower

//! Passthrough dispatcher that logs request/response traffic.
//!
//! Installed between the session loop and the real dispatcher when the
//! server runs with `--debug`.

use log::debug;
use ninep_wire::{OpenMode, Qid, Stat};

use crate::dynamic::server::NineServer;
use crate::dynamic::tree::Fid;
use crate::error::Result;

/// Wraps any [`NineServer`] and traces each call.
pub struct DebugServer<S> {
    inner: S,
}

impl<S: NineServer> DebugServer<S> {
    /// Wrap the given dispatcher.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

fn traced<T: std::fmt::Debug>(reply: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(value) => debug!("<<< {reply} {value:?}"),
        Err(err) => debug!("<<< Rerror {err}"),
    }
    result
}

impl<S: NineServer> NineServer for DebugServer<S> {
    fn rversion(&self, msize: u32, version: &str) -> Result<(u32, String)> {
        debug!(">>> Tversion msize {msize} version {version}");
        traced("Rversion", self.inner.rversion(msize, version))
    }

    fn rattach(&self, fid: Fid, afid: Fid, uname: &str, aname: &str) -> Result<Qid> {
        debug!(">>> Tattach fid {fid} afid {afid} uname {uname:?} aname {aname:?}");
        traced("Rattach", self.inner.rattach(fid, afid, uname, aname))
    }

    fn rflush(&self, oldtag: u16) -> Result<()> {
        debug!(">>> Tflush oldtag {oldtag}");
        traced("Rflush", self.inner.rflush(oldtag))
    }

    fn rwalk(&self, fid: Fid, newfid: Fid, wnames: &[String]) -> Result<Vec<Qid>> {
        debug!(">>> Twalk fid {fid} newfid {newfid} wnames {wnames:?}");
        traced("Rwalk", self.inner.rwalk(fid, newfid, wnames))
    }

    fn ropen(&self, fid: Fid, mode: OpenMode) -> Result<(Qid, u32)> {
        debug!(">>> Topen fid {fid} mode {:#04x}", mode.raw());
        traced("Ropen", self.inner.ropen(fid, mode))
    }

    fn rcreate(&self, fid: Fid, name: &str, perm: u32, mode: OpenMode) -> Result<(Qid, u32)> {
        debug!(">>> Tcreate fid {fid} name {name:?} perm {perm:#o} mode {:#04x}", mode.raw());
        traced("Rcreate", self.inner.rcreate(fid, name, perm, mode))
    }

    fn rread(&self, fid: Fid, offset: u64, count: u32) -> Result<Vec<u8>> {
        debug!(">>> Tread fid {fid} offset {offset} count {count}");
        match self.inner.rread(fid, offset, count) {
            Ok(data) => {
                debug!("<<< Rread {} bytes", data.len());
                Ok(data)
            }
            Err(err) => {
                debug!("<<< Rerror {err}");
                Err(err)
            }
        }
    }

    fn rwrite(&self, fid: Fid, offset: u64, data: &[u8]) -> Result<u32> {
        debug!(">>> Twrite fid {fid} offset {offset} count {}", data.len());
        traced("Rwrite", self.inner.rwrite(fid, offset, data))
    }

    fn rclunk(&self, fid: Fid) -> Result<()> {
        debug!(">>> Tclunk fid {fid}");
        traced("Rclunk", self.inner.rclunk(fid))
    }

    fn rremove(&self, fid: Fid) -> Result<()> {
        debug!(">>> Tremove fid {fid}");
        traced("Rremove", self.inner.rremove(fid))
    }

    fn rstat(&self, fid: Fid) -> Result<Stat> {
        debug!(">>> Tstat fid {fid}");
        traced("Rstat", self.inner.rstat(fid))
    }

    fn rwstat(&self, fid: Fid, stat: &Stat) -> Result<()> {
        debug!(">>> Twstat fid {fid} {stat:?}");
        traced("Rwstat", self.inner.rwstat(fid, stat))
    }
}
