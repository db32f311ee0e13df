//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use bisync_core::{Bisync, Options, RunReport};
use bisync_fs::{Backend, LocalBackend};
use bisync_test_utils::{FlakyBackend, TestTree};
use tempfile::TempDir;

/// Two trees plus a private work directory for their state.
pub struct Pair {
    pub one: TestTree,
    pub two: TestTree,
    pub work: TempDir,
}

impl Pair {
    pub fn new() -> Self {
        Self {
            one: TestTree::new(),
            two: TestTree::new(),
            work: TempDir::new().unwrap(),
        }
    }

    /// Defaults with the work directory pointed at this pair's.
    pub fn options(&self) -> Options {
        Options {
            workdir: Some(self.work.path().to_path_buf()),
            ..Options::default()
        }
    }

    pub fn bisync(&self, options: Options) -> Bisync {
        Bisync::local(self.one.root(), self.two.root(), options).unwrap()
    }

    pub async fn run(&self, options: Options) -> bisync_core::Result<RunReport> {
        self.bisync(options).run().await
    }

    /// Establish the baseline from whatever both trees hold now.
    pub async fn resync(&self) -> RunReport {
        let report = self
            .run(Options {
                resync: true,
                ..self.options()
            })
            .await
            .unwrap();
        assert!(report.success, "resync failed: {:?}", report.output);
        report
    }

    /// Normal run that must succeed.
    pub async fn sync(&self) -> RunReport {
        let report = self.run(self.options()).await.unwrap();
        assert!(report.success, "sync failed: {:?}", report.failures);
        report
    }

    /// Pair whose path2 side fails on demand.
    pub fn flaky(&self, options: Options) -> (Bisync, Arc<FlakyBackend>) {
        let flaky = Arc::new(FlakyBackend::new(LocalBackend::new(self.two.root())));
        let bisync = Bisync::new(
            Arc::new(LocalBackend::new(self.one.root())) as Arc<dyn Backend>,
            flaky.clone() as Arc<dyn Backend>,
            options,
        )
        .unwrap();
        (bisync, flaky)
    }
}
