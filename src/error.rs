// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the server-side error taxonomy mapped onto Rerror.
// Author: Lukas Bower

//! Error kinds surfaced to 9P clients.
//!
//! Every variant renders to the Rerror string a client sees. Handler
//! failures never take the server down; only framing corruption does, and
//! that closes the connection in the session loop.

use thiserror::Error;

/// Server error taxonomy.
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed message, version mismatch, or misused fid/tag.
    #[error("{0}")]
    Protocol(String),

    /// No entry matches a name, walk component, or fid.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Operation the handler refuses unconditionally.
    #[error("{0} is not supported")]
    NotSupported(&'static str),

    /// Single-writer violation on a writable handler.
    #[error("{0} doesn't support concurrent writes")]
    Busy(&'static str),

    /// The upstream API failed; carries the upstream reason verbatim.
    #[error("{0}")]
    Upstream(String),

    /// A form document failed to parse back into its record.
    #[error("{0}")]
    Codec(String),
}

/// Result alias used throughout the server.
pub type Result<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Reason string encoded into the Rerror message.
    #[must_use]
    pub fn ename(&self) -> String {
        self.to_string()
    }
}

impl From<ninep_wire::WireError> for FsError {
    fn from(err: ninep_wire::WireError) -> Self {
        FsError::Protocol(err.to_string())
    }
}
