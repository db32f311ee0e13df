//! End-to-end runs over pairs of local directories

mod common;

use bisync_core::{Action, ConflictLoser, ConflictPolicy, Options, RunMode};
use common::Pair;
use pretty_assertions::assert_eq;

fn seeded() -> Pair {
    let pair = Pair::new();
    for tree in [&pair.one, &pair.two] {
        tree.write("a.txt", "alpha");
        tree.write("b.txt", "bravo");
        tree.write("docs/c.md", "charlie");
        tree.write("docs/deep/d.md", "delta");
    }
    pair
}

#[tokio::test]
async fn test_in_sync_pair_produces_empty_plan() {
    let pair = seeded();
    let resync = pair.resync().await;
    assert_eq!(resync.mode, RunMode::Resync);
    assert!(resync.plan.is_empty());

    let report = pair.sync().await;
    assert!(report.plan.is_empty());
    assert_eq!(report.changed_actions().count(), 0);
    assert_eq!(report.actions.len(), 4);
}

#[tokio::test]
async fn test_new_file_is_copied_once() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write("docs/new.md", "fresh");
    let report = pair.sync().await;

    assert_eq!(report.copies, 1);
    assert_eq!(report.deletes, 0);
    pair.two.assert_file_contains("docs/new.md", "fresh");

    let again = pair.sync().await;
    assert!(again.plan.is_empty(), "second run planned {:?}", again.plan);
}

#[tokio::test]
async fn test_modification_on_path2_flows_back() {
    let pair = seeded();
    pair.resync().await;

    pair.two.write_at("b.txt", "bravo, edited", 30);
    let report = pair.sync().await;

    assert_eq!(report.copies, 1);
    pair.one.assert_file_contains("b.txt", "bravo, edited");
    pair.one.assert_same_files(&pair.two);
}

#[tokio::test]
async fn test_copied_file_keeps_modification_time() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write_at("stamped.txt", "t", 500);
    pair.sync().await;

    let source = std::fs::metadata(pair.one.path("stamped.txt")).unwrap().modified().unwrap();
    let copy = std::fs::metadata(pair.two.path("stamped.txt")).unwrap().modified().unwrap();
    assert_eq!(source, copy);
}

#[tokio::test]
async fn test_deletion_propagates() {
    let pair = seeded();
    pair.resync().await;

    pair.one.remove("docs/c.md");
    let report = pair.sync().await;

    assert_eq!(report.deletes, 1);
    pair.two.assert_file_not_exists("docs/c.md");
    pair.two.assert_file_exists("docs/deep/d.md");
}

#[tokio::test]
async fn test_deleted_file_lands_in_backup_dir() {
    let pair = seeded();
    let backup = tempfile::TempDir::new().unwrap();
    pair.resync().await;

    pair.one.remove("a.txt");
    let options = Options {
        backup_dir2: Some(backup.path().to_string_lossy().to_string()),
        ..pair.options()
    };
    let report = pair.run(options).await.unwrap();

    assert!(report.success);
    pair.two.assert_file_not_exists("a.txt");
    assert_eq!(std::fs::read_to_string(backup.path().join("a.txt")).unwrap(), "alpha");
}

#[tokio::test]
async fn test_unresolved_conflict_keeps_both_versions() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write("x.txt", "from one");
    pair.two.write("x.txt", "from two, longer");
    let report = pair.sync().await;

    assert_eq!(report.conflicts, 1);
    for tree in [&pair.one, &pair.two] {
        tree.assert_file_not_exists("x.txt");
        tree.assert_file_contains("x.txt.conflict1", "from one");
        tree.assert_file_contains("x.txt.conflict2", "from two, longer");
    }

    let again = pair.sync().await;
    assert!(again.plan.is_empty(), "second run planned {:?}", again.plan);
}

#[tokio::test]
async fn test_newer_conflict_renames_loser() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write_at("x.txt", "older", 10);
    pair.two.write_at("x.txt", "newer", 100);
    let options = Options {
        conflict_resolve: ConflictPolicy::Newer,
        ..pair.options()
    };
    let report = pair.run(options).await.unwrap();

    assert!(report.success);
    let conflict = report
        .actions
        .iter()
        .find(|a| a.path.as_str() == "x.txt")
        .unwrap();
    assert_eq!(conflict.action, Action::Conflict);

    for tree in [&pair.one, &pair.two] {
        tree.assert_file_contains("x.txt", "newer");
        tree.assert_file_contains("x.txt.conflict1", "older");
    }
}

#[tokio::test]
async fn test_conflict_loser_delete_overwrites() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write("a.txt", "edited on one");
    pair.two.write("a.txt", "edited on two!");
    let options = Options {
        conflict_resolve: ConflictPolicy::Path1,
        conflict_loser: ConflictLoser::Delete,
        ..pair.options()
    };
    pair.run(options).await.unwrap();

    pair.two.assert_file_contains("a.txt", "edited on one");
    assert_eq!(pair.two.files(), pair.one.files());
    assert!(!pair.two.files().iter().any(|f| f.contains("conflict")));
}

#[tokio::test]
async fn test_identical_edits_are_not_conflicts() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write("a.txt", "same edit");
    pair.two.write("a.txt", "same edit");
    let report = pair.sync().await;

    assert_eq!(report.conflicts, 0);
    assert!(report.plan.is_empty());
}

#[tokio::test]
async fn test_resync_path1_mirrors_path1() {
    let pair = Pair::new();
    pair.one.write("a", "one");
    pair.one.write("b", "one's b");
    pair.two.write("b", "two's b");
    pair.two.write("c", "only two");

    let report = pair
        .run(Options {
            resync: true,
            resync_mode: ConflictPolicy::Path1,
            ..pair.options()
        })
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(pair.two.files(), vec!["a", "b"]);
    pair.two.assert_file_contains("b", "one's b");
    pair.one.assert_same_files(&pair.two);
}

#[tokio::test]
async fn test_resync_none_takes_union_and_prefers_path1() {
    let pair = Pair::new();
    pair.one.write("a", "one");
    pair.one.write("b", "one's b");
    pair.two.write("b", "two's b");
    pair.two.write("c", "only two");

    pair.resync().await;

    assert_eq!(pair.one.files(), vec!["a", "b", "c"]);
    pair.one.assert_same_files(&pair.two);
    pair.two.assert_file_contains("b", "one's b");
}

#[tokio::test]
async fn test_resync_newer_picks_per_file() {
    let pair = Pair::new();
    pair.one.write_at("left", "one is newer", 50);
    pair.two.write_at("left", "old", 10);
    pair.one.write_at("right", "old", 10);
    pair.two.write_at("right", "two is newer", 50);

    pair.run(Options {
        resync: true,
        resync_mode: ConflictPolicy::Newer,
        ..pair.options()
    })
    .await
    .unwrap();

    for tree in [&pair.one, &pair.two] {
        tree.assert_file_contains("left", "one is newer");
        tree.assert_file_contains("right", "two is newer");
    }
}

#[tokio::test]
async fn test_resync_creates_empty_dirs_when_asked() {
    let pair = Pair::new();
    pair.one.write("a", "x");
    pair.one.mkdir("empty/nested");

    pair.run(Options {
        resync: true,
        create_empty_src_dirs: true,
        ..pair.options()
    })
    .await
    .unwrap();

    assert_eq!(pair.two.dirs(), vec!["empty", "empty/nested"]);
}

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let pair = seeded();
    pair.resync().await;

    pair.one.write("planned.txt", "p");
    pair.two.remove("b.txt");
    let report = pair
        .run(Options {
            dry_run: true,
            ..pair.options()
        })
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.dry_run);
    assert_eq!(report.plan.len(), 2);
    assert!(report.output.iter().any(|l| l.contains("(dry run)")));
    pair.two.assert_file_not_exists("planned.txt");
    pair.one.assert_file_exists("b.txt");

    let real = pair.sync().await;
    assert_eq!(real.plan.len(), 2);
    pair.two.assert_file_contains("planned.txt", "p");
    pair.one.assert_file_not_exists("b.txt");
}

#[tokio::test]
async fn test_filtered_files_are_left_alone() {
    let pair = seeded();
    let filters = pair.work.path().join("filters.txt");
    std::fs::write(&filters, "- *.tmp\n- /docs/deep/\n").unwrap();
    let options = Options {
        filters_file: Some(filters),
        ..pair.options()
    };
    pair.run(Options {
        resync: true,
        ..options.clone()
    })
    .await
    .unwrap();

    pair.one.write("scratch.tmp", "ignored");
    pair.one.write("docs/deep/e.md", "ignored too");
    pair.one.write("kept.md", "synced");
    let report = pair.run(options).await.unwrap();

    assert_eq!(report.copies, 1);
    pair.two.assert_file_exists("kept.md");
    pair.two.assert_file_not_exists("scratch.tmp");
    pair.two.assert_file_not_exists("docs/deep/e.md");
}

#[tokio::test]
async fn test_report_serializes_for_callers() {
    let pair = seeded();
    pair.resync().await;
    pair.one.write("n", "n");

    let report = pair.sync().await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["success"], true);
    assert_eq!(json["mode"], "normal");
    assert_eq!(json["copies"], 1);
    assert_eq!(json["plan"][0]["op"], "copy");
}

#[tokio::test]
async fn test_file_replaced_by_directory_propagates() {
    let pair = seeded();
    for tree in [&pair.one, &pair.two] {
        tree.write("x", "plain file");
    }
    pair.resync().await;

    pair.two.remove("x");
    pair.two.write("x/child.txt", "now a directory");
    let report = pair.sync().await;

    assert_eq!(report.conflicts, 0);
    pair.one.assert_file_contains("x/child.txt", "now a directory");
    pair.one.assert_same_files(&pair.two);
    assert!(pair.sync().await.plan.is_empty());
}

#[tokio::test]
async fn test_directory_replaced_by_file_propagates() {
    let pair = seeded();
    pair.resync().await;

    pair.one.remove("docs");
    pair.one.write("docs", "now a file");
    let report = pair.sync().await;

    assert_eq!(report.conflicts, 0);
    pair.two.assert_file_contains("docs", "now a file");
    assert!(!pair.two.path("docs/deep").exists());
    pair.one.assert_same_files(&pair.two);
    assert!(pair.sync().await.plan.is_empty());
}

#[tokio::test]
async fn test_file_facing_new_directory_content_keeps_both() {
    let pair = seeded();
    pair.resync().await;

    pair.one.remove("docs");
    pair.one.write("docs", "now a file");
    pair.two.write("docs/added.md", "added on path2");
    let report = pair.sync().await;

    assert_eq!(report.conflicts, 1);
    pair.two.assert_file_contains("docs.conflict1", "now a file");
    pair.one.assert_file_contains("docs/added.md", "added on path2");
    pair.one.assert_file_not_exists("docs/c.md");
    pair.one.assert_same_files(&pair.two);
    assert!(pair.sync().await.plan.is_empty());
}
