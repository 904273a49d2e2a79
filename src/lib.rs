// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the forgefs library modules to the binary and tests.
// Author: Lukas Bower

//! forgefs serves a source-forge REST API as a live 9P2000 filesystem.
//!
//! The tree is a lazily-populated, append-only entry table. Reading a file
//! fetches the backing object from the upstream API; writing a markform
//! document back pushes the edited fields upstream.

#![forbid(unsafe_code)]

pub mod dynamic;
pub mod error;
pub mod handlers;
pub mod markform;
pub mod upstream;

pub use error::{FsError, Result};
