//! Remote-control entry point
//!
//! Maps named JSON parameters (as sent to `sync/bisync`) onto [`Options`]
//! in a single pass. Every problem with the parameters is collected and
//! reported together in one [`Error::Config`].

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::engine::Bisync;
use crate::options::Options;
use crate::{Error, Result};

/// Decoded remote-control call
#[derive(Debug, Clone)]
pub struct RcRequest {
    pub path1: String,
    pub path2: String,
    pub options: Options,
}

type Field<T> = std::result::Result<T, String>;

fn boolean(value: &Value) -> Field<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => s
            .parse::<bool>()
            .map_err(|_| format!("expected a boolean, got {:?}", s)),
        other => Err(format!("expected a boolean, got {}", other)),
    }
}

fn integer(value: &Value) -> Field<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .ok_or_else(|| format!("expected an integer, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got {:?}", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn count(value: &Value) -> Field<usize> {
    let n = integer(value)?;
    usize::try_from(n).map_err(|_| format!("expected a non-negative integer, got {}", n))
}

fn string(value: &Value) -> Field<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(format!("expected a string, got {}", other)),
    }
}

fn parsed<T: std::str::FromStr<Err = String>>(value: &Value) -> Field<T> {
    string(value)?.parse()
}

/// `checkSync` is a string in the rc API; booleans are accepted too.
fn check_sync(value: &Value) -> Field<crate::options::CheckSync> {
    match value {
        Value::Bool(true) => Ok(crate::options::CheckSync::True),
        Value::Bool(false) => Ok(crate::options::CheckSync::False),
        other => parsed(other),
    }
}

/// Decode remote-control parameters.
///
/// # Example
///
/// ```
/// use bisync_core::rc::decode_params;
/// use serde_json::json;
///
/// let params = json!({"path1": "/a", "path2": "/b", "maxDelete": 10, "checkSync": "only"});
/// let request = decode_params(params.as_object().unwrap()).unwrap();
/// assert_eq!(request.options.max_delete, 10);
/// ```
pub fn decode_params(params: &Map<String, Value>) -> Result<RcRequest> {
    let mut options = Options::default();
    let mut path1 = None;
    let mut path2 = None;
    let mut problems = Vec::new();

    for (key, value) in params {
        let outcome: Field<()> = match key.as_str() {
            "path1" => string(value).map(|s| path1 = Some(s)),
            "path2" => string(value).map(|s| path2 = Some(s)),
            "dryRun" => boolean(value).map(|b| options.dry_run = b),
            "maxDelete" => integer(value).map(|n| options.max_delete = n),
            "resync" => boolean(value).map(|b| options.resync = b),
            "resyncmode" | "resyncMode" => parsed(value).map(|p| options.resync_mode = p),
            "checkAccess" => boolean(value).map(|b| options.check_access = b),
            "checkFilename" => string(value).map(|s| options.check_filename = s),
            "force" => boolean(value).map(|b| options.force = b),
            "createEmptySrcDirs" => boolean(value).map(|b| options.create_empty_src_dirs = b),
            "removeEmptyDirs" => boolean(value).map(|b| options.remove_empty_dirs = b),
            "noCleanup" => boolean(value).map(|b| options.no_cleanup = b),
            "ignoreListingChecksum" => boolean(value).map(|b| options.ignore_listing_checksum = b),
            "resilient" => boolean(value).map(|b| options.resilient = b),
            "recover" => boolean(value).map(|b| options.recover = b),
            "filtersFile" => string(value).map(|s| options.filters_file = Some(PathBuf::from(s))),
            "workdir" => string(value).map(|s| options.workdir = Some(PathBuf::from(s))),
            "backupdir1" | "backupDir1" => string(value).map(|s| options.backup_dir1 = Some(s)),
            "backupdir2" | "backupDir2" => string(value).map(|s| options.backup_dir2 = Some(s)),
            "conflictresolve" | "conflictResolve" => parsed(value).map(|p| options.conflict_resolve = p),
            "conflictloser" | "conflictLoser" => parsed(value).map(|l| options.conflict_loser = l),
            "conflictsuffix" | "conflictSuffix" => string(value).map(|s| options.conflict_suffix = s),
            "checkSync" => check_sync(value).map(|c| options.check_sync = c),
            "transfers" => count(value).map(|n| options.transfers = n),
            "checkers" => count(value).map(|n| options.checkers = n),
            other => {
                problems.push(format!("unknown parameter {:?}", other));
                continue;
            }
        };
        if let Err(problem) = outcome {
            problems.push(format!("{}: {}", key, problem));
        }
    }

    if path1.is_none() {
        problems.push("path1 is required".to_string());
    }
    if path2.is_none() {
        problems.push("path2 is required".to_string());
    }
    if let Err(Error::Config { problems: more }) = options.validate() {
        problems.extend(more);
    }

    match (path1, path2) {
        (Some(path1), Some(path2)) if problems.is_empty() => Ok(RcRequest { path1, path2, options }),
        _ => Err(Error::Config { problems }),
    }
}

/// Failed `sync/bisync` call
///
/// Carries whatever the run printed before it failed; the output is empty
/// when the parameters were rejected before a run started.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct RcError {
    pub output: String,
    pub source: Error,
}

impl RcError {
    /// `{"output": "...", "error": "..."}` for the caller.
    pub fn to_json(&self) -> Value {
        json!({
            "output": self.output,
            "error": self.source.to_string(),
        })
    }
}

impl From<Error> for RcError {
    fn from(source: Error) -> Self {
        Self {
            output: String::new(),
            source,
        }
    }
}

/// Handle a `sync/bisync` call between two local directories.
///
/// Returns `{"output": "...", "result": {...}}` where `output` holds the
/// lines the run printed. A failed run keeps those lines in [`RcError`].
pub async fn rc_bisync(params: &Map<String, Value>) -> std::result::Result<Value, RcError> {
    let request = decode_params(params)?;
    let bisync = Bisync::local(&request.path1, &request.path2, request.options)?;
    let (report, outcome) = bisync.run_reporting().await;
    let output = report.output.join("\n");

    match outcome {
        Ok(()) => Ok(json!({
            "output": output,
            "result": report,
        })),
        Err(source) => Err(RcError { output, source }),
    }
}
