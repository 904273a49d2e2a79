// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the 9P2000 wire codec shared by server and tests.
// Author: Lukas Bower

//! 9P2000 wire protocol: message types, framing, and the directory-entry
//! (stat) record format.
//!
//! The crate is transport-agnostic. Callers hand complete frames to
//! [`decode_request`]/[`decode_response`] and send the byte vectors
//! produced by [`encode_request`]/[`encode_response`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod stat;
mod types;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use stat::Stat;
pub use types::{
    OpenMode, Qid, QidType, Request, RequestBody, Response, ResponseBody, WireError, DMDIR,
    IOHDRSZ, IOUNIT, MAX_MSIZE, NOFID, NOTAG, VERSION,
};
