use crate::error::{ErrorKind, FailedFile, ProcessError};
use crate::layout::{inspect_destination, Occupant};
use crate::planner::{ActionKind, OrganizePlan, PlannedAction};
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutedAction {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApplyReport {
    pub executed: Vec<ExecutedAction>,
    pub skipped: usize,
    pub failures: Vec<FailedFile>,
}

/// Counts for one run, planning failures included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub dry_run: bool,
    /// Files written, or files that would be written in a dry run.
    pub executed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<FailedFile>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Summary of a run. `report` is `None` for dry runs.
pub fn summarize(plan: &OrganizePlan, report: Option<&ApplyReport>) -> RunSummary {
    let mut failures = plan.failures.clone();
    let (executed, skipped) = match report {
        Some(report) => {
            failures.extend(report.failures.iter().cloned());
            (report.executed.len(), report.skipped)
        }
        None => {
            let skipped = plan.actions.iter().filter(|a| a.kind.is_skip()).count();
            (plan.actions.len() - skipped, skipped)
        }
    };
    failures.sort_by(|a, b| a.path.cmp(&b.path));

    RunSummary {
        dry_run: report.is_none(),
        executed,
        skipped,
        failed: failures.len(),
        failures,
    }
}

/// Executes copy and move actions in plan order. Each failure stays with its
/// file; the remaining actions still run.
pub fn apply_plan(plan: &OrganizePlan, output_root: &Path) -> ApplyReport {
    let mut report = ApplyReport::default();

    for (index, action) in plan.actions.iter().enumerate() {
        if action.kind.is_skip() {
            report.skipped += 1;
            continue;
        }
        let Some(destination) = action.destination.as_ref() else {
            report.skipped += 1;
            continue;
        };
        let target = output_root.join(destination.relative_path());

        match execute(action, &target, index) {
            Ok(Outcome::Written) => {
                info!(
                    source = %action.source.path.display(),
                    destination = %target.display(),
                    kind = ?action.kind,
                    "organized"
                );
                report.executed.push(ExecutedAction {
                    source: action.source.path.clone(),
                    destination: target,
                    kind: action.kind,
                });
            }
            Ok(Outcome::AlreadyPresent(existing)) => {
                info!(
                    source = %action.source.path.display(),
                    existing = %existing.display(),
                    "already present at destination"
                );
                report.skipped += 1;
            }
            Err(err) => {
                if err.kind() == ErrorKind::NamingCollision {
                    warn!(error = %err, "destination taken");
                } else {
                    warn!(error = %err, "file operation failed");
                }
                report
                    .failures
                    .push(FailedFile::new(action.source.path.clone(), &err));
            }
        }
    }

    report
}

enum Outcome {
    Written,
    AlreadyPresent(PathBuf),
}

fn execute(action: &PlannedAction, target: &Path, index: usize) -> Result<Outcome, ProcessError> {
    let source = &action.source.path;
    let io_error = |err: io::Error| ProcessError::FilesystemExecution {
        path: source.clone(),
        source: err,
    };

    let dir = target.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(io_error)?;

    // The tree may have changed since planning.
    let base = target
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    match inspect_destination(source, dir, &base, &action.source.extension).map_err(io_error)? {
        Occupant::Identical(existing) => return Ok(Outcome::AlreadyPresent(existing)),
        Occupant::Conflicting(existing) => {
            return Err(ProcessError::NamingCollision {
                path: source.clone(),
                existing,
            })
        }
        Occupant::Vacant => {}
    }
    if target.exists() {
        return Err(ProcessError::NamingCollision {
            path: source.clone(),
            existing: target.to_path_buf(),
        });
    }

    match action.kind {
        ActionKind::Move => move_file(source, target, index).map_err(io_error)?,
        _ => staged_copy(source, target, index).map_err(io_error)?,
    }
    Ok(Outcome::Written)
}

/// Rename when source and target share a filesystem, else copy and delete.
fn move_file(source: &Path, target: &Path, index: usize) -> io::Result<()> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    staged_copy(source, target, index)?;
    fs::remove_file(source)
}

/// Copies into a hidden temp file next to the target, carries the source
/// mtime over and renames into place.
fn staged_copy(source: &Path, target: &Path, index: usize) -> io::Result<()> {
    let temp = temp_path_for(target, index);
    let result = fs::copy(source, &temp).and_then(|_| {
        let mtime = FileTime::from_last_modification_time(&fs::metadata(source)?);
        filetime::set_file_mtime(&temp, mtime)?;
        if target.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("出力先が既に存在します: {}", target.display()),
            ));
        }
        fs::rename(&temp, target)
    });

    if result.is_err() && temp.exists() {
        let _ = fs::remove_file(&temp);
    }
    result
}

fn temp_path_for(target: &Path, index: usize) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let file_name = target
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    parent.join(format!(".mediasort_tmp_{now}_{index}_{file_name}"))
}
