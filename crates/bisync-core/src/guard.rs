//! Pre-execution safety checks
//!
//! Guards stop a run before anything is modified. A guard failure is a
//! deliberate stop; it is reported and never retried.

use std::collections::BTreeSet;

use bisync_fs::{EntryKind, RelPath};
use tracing::{debug, error};

use crate::delta::{Classification, Comparator};
use crate::snapshot::Snapshot;
use crate::{Error, Result};

fn markers<'a>(snapshot: &'a Snapshot, filename: &str) -> BTreeSet<&'a RelPath> {
    snapshot
        .entries()
        .filter(|e| e.kind == EntryKind::File && e.path.file_name() == Some(filename))
        .map(|e| &e.path)
        .collect()
}

/// Require the access marker on both sides at identical paths.
pub fn check_access(cur1: &Snapshot, cur2: &Snapshot, filename: &str) -> Result<()> {
    let m1 = markers(cur1, filename);
    let m2 = markers(cur2, filename);

    let reason = if m1.is_empty() || m2.is_empty() {
        Some(format!(
            "access check failed: {:?} found {} time(s) on path1 and {} time(s) on path2",
            filename,
            m1.len(),
            m2.len()
        ))
    } else if m1 != m2 {
        let mismatched: Vec<String> = m1
            .symmetric_difference(&m2)
            .map(|p| p.to_string())
            .collect();
        Some(format!(
            "access check failed: {:?} markers differ between sides ({})",
            filename,
            mismatched.join(", ")
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => {
            error!(check = "access", "{}", reason);
            Err(Error::SafetyAbort { reason })
        }
        None => {
            debug!(markers = m1.len(), "Access check passed");
            Ok(())
        }
    }
}

/// Refuse plans that delete more than `max_delete` percent of all paths.
pub fn check_delete_threshold(classification: &Classification, max_delete: i64, force: bool) -> Result<()> {
    let deletions = classification.deletions();
    let total = classification.total();
    let limit = max_delete.clamp(0, 100) as usize;

    if deletions * 100 <= limit * total {
        return Ok(());
    }
    if force {
        tracing::warn!(deletions, total, max_delete, "Delete threshold exceeded, continuing with --force");
        return Ok(());
    }

    let reason = format!(
        "too many deletes: {} of {} paths ({}%) exceeds maxDelete {}%; rerun with --force to proceed",
        deletions,
        total,
        deletions * 100 / total.max(1),
        limit
    );
    error!(check = "max_delete", "{}", reason);
    Err(Error::SafetyAbort { reason })
}

/// Paths on which two listings disagree.
pub fn listing_differences(s1: &Snapshot, s2: &Snapshot, cmp: &Comparator) -> Vec<String> {
    let paths: BTreeSet<&RelPath> = s1.paths().chain(s2.paths()).collect();
    paths
        .into_iter()
        .filter_map(|path| match (s1.get(path), s2.get(path)) {
            (Some(_), None) => Some(format!("{}: only on path1", path)),
            (None, Some(_)) => Some(format!("{}: only on path2", path)),
            (Some(a), Some(b)) if !cmp.equal(a, b) => Some(format!("{}: differs", path)),
            _ => None,
        })
        .collect()
}

/// Require two listings to describe the same tree.
pub fn check_sync(s1: &Snapshot, s2: &Snapshot, cmp: &Comparator) -> Result<()> {
    let differences = listing_differences(s1, s2, cmp);
    if differences.is_empty() {
        return Ok(());
    }
    for difference in differences.iter().take(20) {
        error!(check = "check_sync", "{}", difference);
    }
    Err(Error::CheckSyncFailed { differences })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{Action, Side};
    use crate::snapshot::Entry;
    use chrono::Utc;
    use rstest::rstest;

    fn rel(p: &str) -> RelPath {
        RelPath::new(p).unwrap()
    }

    fn snap(paths: &[&str]) -> Snapshot {
        let now = Utc::now();
        Snapshot::from_entries(paths.iter().map(|p| Entry::file(rel(p), 0, now))).unwrap()
    }

    fn with_deletions(deleted: usize, total: usize) -> Classification {
        let actions = (0..total)
            .map(|i| {
                let action = if i < deleted {
                    Action::Deleted(Side::Path1)
                } else {
                    Action::Unchanged
                };
                (rel(&format!("f{:03}", i)), action)
            })
            .collect();
        Classification { actions }
    }

    #[test]
    fn access_check_passes_with_matching_markers() {
        let a = snap(&["BISYNC_TEST", "sub/BISYNC_TEST", "x"]);
        let b = snap(&["BISYNC_TEST", "sub/BISYNC_TEST"]);
        check_access(&a, &b, "BISYNC_TEST").unwrap();
    }

    #[test]
    fn access_check_fails_when_missing_on_one_side() {
        let a = snap(&["BISYNC_TEST"]);
        let b = snap(&["other"]);
        let err = check_access(&a, &b, "BISYNC_TEST").unwrap_err();
        assert!(matches!(err, Error::SafetyAbort { ref reason } if reason.contains("access check")));
    }

    #[test]
    fn access_check_fails_on_mismatched_markers() {
        let a = snap(&["BISYNC_TEST", "a/BISYNC_TEST"]);
        let b = snap(&["BISYNC_TEST"]);
        let err = check_access(&a, &b, "BISYNC_TEST").unwrap_err();
        assert!(err.to_string().contains("a/BISYNC_TEST"));
    }

    #[test]
    fn check_sync_lists_differences() {
        let now = Utc::now();
        let a = snap(&["same", "only1"]);
        let mut b = snap(&["same", "only2"]);
        b.insert(Entry::file(rel("same"), 9, now));

        let err = check_sync(&a, &b, &Comparator::default()).unwrap_err();
        match err {
            Error::CheckSyncFailed { differences } => assert_eq!(
                differences,
                vec!["only1: only on path1", "only2: only on path2", "same: differs"]
            ),
            other => panic!("unexpected {:?}", other),
        }
        check_sync(&a, &a.clone(), &Comparator::default()).unwrap();
    }

    #[rstest]
    #[case(30, 50, 25, false, false)]
    #[case(30, 50, 25, true, true)]
    #[case(25, 50, 50, false, true)]
    #[case(26, 50, 50, false, false)]
    #[case(0, 0, 0, false, true)]
    #[case(1, 1, 100, false, true)]
    fn delete_threshold(
        #[case] deleted: usize,
        #[case] total: usize,
        #[case] max_delete: i64,
        #[case] force: bool,
        #[case] allowed: bool,
    ) {
        let result = check_delete_threshold(&with_deletions(deleted, total), max_delete, force);
        assert_eq!(result.is_ok(), allowed, "{:?}", result);
    }
}
