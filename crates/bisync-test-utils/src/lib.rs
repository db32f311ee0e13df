//! Shared test utilities for the bisync workspace.
//!
//! Dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`tree`]: [`TestTree`] builder for directory trees with explicit
//!   modification times
//! - [`flaky`]: [`FlakyBackend`] wrapper that injects storage failures

pub mod flaky;
pub mod tree;

pub use flaky::FlakyBackend;
pub use tree::TestTree;
