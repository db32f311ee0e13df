//! Storage layer for bisync
//!
//! Provides the [`Backend`] abstraction the reconciliation engine talks to,
//! a [`LocalBackend`] for plain directories, relative path handling and
//! the atomic I/O primitives used by both the backend and the state store.

pub mod backend;
pub mod checksum;
pub mod error;
pub mod io;
pub mod path;

pub use backend::{Backend, DirEntry, EntryKind, LocalBackend, PARTIAL_SUFFIX};
pub use error::{Error, Result};
pub use path::RelPath;
