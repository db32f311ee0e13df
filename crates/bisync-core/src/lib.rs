//! Bidirectional reconciliation engine
//!
//! Keeps two storage trees convergent over repeated runs. Each run lists
//! both sides, compares them against the last synchronized baseline,
//! resolves conflicting edits by policy and applies the resulting copy,
//! delete and rename operations, refusing plans that look unsafe.
//!
//! # Example
//!
//! ```no_run
//! use bisync_core::{Bisync, Options};
//!
//! # async fn example() -> bisync_core::Result<()> {
//! let first = Options { resync: true, ..Options::default() };
//! Bisync::local("/data/laptop", "/mnt/backup", first)?.run().await?;
//!
//! let report = Bisync::local("/data/laptop", "/mnt/backup", Options::default())?
//!     .run()
//!     .await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

pub mod conflict;
pub mod delta;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod guard;
pub mod options;
pub mod plan;
pub mod rc;
pub mod recover;
pub mod report;
pub mod snapshot;
pub mod state;

pub use conflict::{ConflictResolver, Resolution};
pub use delta::{Action, Classification, Comparator, Side};
pub use engine::{Bisync, RunPhase};
pub use error::{Error, Result};
pub use filter::FilterSet;
pub use options::{CheckSync, ConflictLoser, ConflictPolicy, Options};
pub use plan::{Operation, Plan};
pub use report::{OperationFailure, PathAction, RunMode, RunReport};
pub use snapshot::{Entry, Snapshot, SnapshotBuilder};
pub use state::StateStore;
