//! Append-only record of a run's plan and step outcomes
//!
//! One JSON object per line. The first line holds the plan, every later
//! line records the outcome of one step. A run that dies mid-write can
//! leave a truncated last line; readers skip it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::plan::{Plan, Step};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalRecord {
    Plan { run_id: String, steps: Vec<Step> },
    Done { index: usize },
    Failed { index: usize, message: String },
}

/// Open journal of the running plan
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Start a fresh journal holding `plan`.
    pub(crate) fn create(path: &Path, run_id: &str, plan: &Plan) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let journal = Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        };
        journal.append(&JournalRecord::Plan {
            run_id: run_id.to_string(),
            steps: plan.steps.clone(),
        })?;
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_done(&self, index: usize) -> Result<()> {
        self.append(&JournalRecord::Done { index })
    }

    pub fn record_failed(&self, index: usize, message: &str) -> Result<()> {
        self.append(&JournalRecord::Failed {
            index,
            message: message.to_string(),
        })
    }

    fn append(&self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

/// A journal read back from disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalContents {
    pub run_id: String,
    pub steps: Vec<Step>,
    pub done: BTreeSet<usize>,
    pub failed: BTreeMap<usize, String>,
}

/// Parse a journal file.
pub(crate) fn read(path: &Path) -> Result<Option<JournalContents>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let corrupt = |message: String| Error::StateCorrupt {
        path: path.to_path_buf(),
        message,
    };

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut contents: Option<JournalContents> = None;

    for (number, line) in lines.iter().enumerate() {
        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) if number + 1 == lines.len() && number > 0 => {
                warn!(path = %path.display(), error = %e, "Ignoring truncated journal line");
                break;
            }
            Err(e) => return Err(corrupt(format!("line {}: {}", number + 1, e))),
        };

        match (record, contents.as_mut()) {
            (JournalRecord::Plan { run_id, steps }, None) => {
                contents = Some(JournalContents {
                    run_id,
                    steps,
                    ..JournalContents::default()
                });
            }
            (JournalRecord::Plan { .. }, Some(_)) => {
                return Err(corrupt(format!("line {}: second plan record", number + 1)));
            }
            (_, None) => return Err(corrupt("journal does not start with a plan".to_string())),
            (JournalRecord::Done { index }, Some(c)) => {
                c.failed.remove(&index);
                c.done.insert(index);
            }
            (JournalRecord::Failed { index, message }, Some(c)) => {
                c.failed.insert(index, message);
            }
        }
    }

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Side;
    use crate::plan::Operation;
    use bisync_fs::RelPath;
    use tempfile::TempDir;

    fn plan() -> Plan {
        let mut plan = Plan::new();
        for name in ["a", "b"] {
            plan.push(
                Operation::Copy {
                    from: Side::Path1,
                    path: RelPath::new(name).unwrap(),
                },
                None,
            );
        }
        plan
    }

    #[test]
    fn records_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("j.jsonl");

        let journal = Journal::create(&path, "run-1", &plan()).unwrap();
        journal.record_failed(1, "disk full").unwrap();
        journal.record_done(0).unwrap();
        drop(journal);

        let contents = read(&path).unwrap().unwrap();
        assert_eq!(contents.run_id, "run-1");
        assert_eq!(contents.steps.len(), 2);
        assert_eq!(contents.done, BTreeSet::from([0]));
        assert_eq!(contents.failed.get(&1).map(String::as_str), Some("disk full"));
    }

    #[test]
    fn truncated_last_line_is_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("j.jsonl");
        let journal = Journal::create(&path, "run-2", &plan()).unwrap();
        journal.record_done(0).unwrap();
        drop(journal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"kind\":\"done\",\"ind").unwrap();

        let contents = read(&path).unwrap().unwrap();
        assert_eq!(contents.done, BTreeSet::from([0]));
    }

    #[test]
    fn missing_journal_is_none() {
        let temp = TempDir::new().unwrap();
        assert!(read(&temp.path().join("nope.jsonl")).unwrap().is_none());
    }

    #[test]
    fn garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("j.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(matches!(read(&path), Err(Error::StateCorrupt { .. })));
    }
}
