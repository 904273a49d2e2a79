// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Group the dynamic 9P server core: table, handlers, dispatch.
// Author: Lukas Bower

//! The dynamic 9P file server core.
//!
//! A shared, append-only [`tree::EntryTable`] maps entry indices (QID
//! paths) to polymorphic [`handler::FileHandler`]s. The
//! [`server::Dispatcher`] validates fids and tags and routes each
//! T-message to the entry bound to its fid.

pub mod debug;
pub mod dir;
pub mod handler;
pub mod server;
pub mod staticfile;
pub mod tree;

pub use debug::DebugServer;
pub use dir::BasicDir;
pub use handler::{basename, join, parent, window, FileHandler};
pub use server::{serve, Dispatcher, NineServer, Session};
pub use staticfile::StaticFile;
pub use tree::{EntryTable, Fid, FileEntry};
