use crate::config::UnknownSourcePolicy;
use crate::error::{FailedFile, ProcessError};
use crate::fields::DescriptiveFields;
use crate::layout::{inspect_destination, plan_directory, same_content, Occupant};
use crate::metadata::{normalize_extension, MediaFile, MetadataReader};
use crate::profile::{classify, SourceProfile};
use crate::template::NamingTemplates;
use crate::timestamp::{Reliability, ResolvedTimestamp, TimeZoneSetting, TimestampResolver};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Resolved settings for one organize run.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub recursive: bool,
    pub include_hidden: bool,
    pub timezone: TimeZoneSetting,
    pub remove_processed: bool,
    pub unknown_sources: UnknownSourcePolicy,
    pub filesystem_fallback: bool,
    pub naming: NamingTemplates,
    /// 0 uses one worker per CPU.
    pub workers: usize,
}

impl PlanOptions {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            recursive: false,
            include_hidden: false,
            timezone: TimeZoneSetting::Local,
            remove_processed: false,
            unknown_sources: UnknownSourcePolicy::Route,
            filesystem_fallback: true,
            naming: NamingTemplates::default(),
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActionKind {
    Copy,
    Move,
    SkipAlreadyProcessed,
    SkipUnclassifiable,
}

impl ActionKind {
    pub fn is_skip(self) -> bool {
        matches!(self, Self::SkipAlreadyProcessed | Self::SkipUnclassifiable)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    /// Relative to the output root.
    pub dir: PathBuf,
    pub file_name: String,
}

impl Destination {
    pub fn relative_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub source: MediaFile,
    /// `None` only for unclassifiable skips.
    pub destination: Option<Destination>,
    pub kind: ActionKind,
    pub profile: SourceProfile,
    pub timestamp: Option<ResolvedTimestamp>,
    /// Output file that made this an already-processed skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub scanned_files: usize,
    pub media_files: usize,
    pub skipped_hidden: usize,
    pub skipped_unsupported: usize,
    pub planned: usize,
    pub already_processed: usize,
    pub unclassifiable: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizePlan {
    pub input: PathBuf,
    pub output: PathBuf,
    pub actions: Vec<PlannedAction>,
    pub failures: Vec<FailedFile>,
    pub stats: PlanStats,
}

impl OrganizePlan {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Result of the per-file parallel stage.
#[derive(Debug)]
enum Prepared {
    Unclassifiable(SourceProfile),
    Ready {
        profile: SourceProfile,
        timestamp: ResolvedTimestamp,
        dir: PathBuf,
        base: String,
    },
}

/// Builds the full plan without touching the output tree.
pub fn generate_plan(options: &PlanOptions, reader: &dyn MetadataReader) -> Result<OrganizePlan> {
    if !options.input.is_dir() {
        anyhow::bail!("入力フォルダが存在しません: {}", options.input.display());
    }

    let mut stats = PlanStats::default();
    let files = collect_media_files(
        &options.input,
        options.recursive,
        options.include_hidden,
        &mut stats,
    )?;

    let resolver = TimestampResolver {
        timezone: options.timezone,
        filesystem_fallback: options.filesystem_fallback,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers)
        .build()
        .context("ワーカープールを作成できませんでした")?;
    let prepared: Vec<Result<Prepared, ProcessError>> = pool.install(|| {
        files
            .par_iter()
            .map(|file| prepare(file, reader, &resolver, options))
            .collect()
    });

    let transfer = if options.remove_processed {
        ActionKind::Move
    } else {
        ActionKind::Copy
    };
    let mut claims = Claims::default();
    let mut actions = Vec::with_capacity(files.len());
    let mut failures = Vec::new();

    for (file, outcome) in files.into_iter().zip(prepared) {
        let (profile, timestamp, dir, base) = match outcome {
            Ok(Prepared::Ready {
                profile,
                timestamp,
                dir,
                base,
            }) => (profile, timestamp, dir, base),
            Ok(Prepared::Unclassifiable(profile)) => {
                debug!(path = %file.path.display(), "unclassifiable source skipped");
                stats.unclassifiable += 1;
                actions.push(PlannedAction {
                    source: file,
                    destination: None,
                    kind: ActionKind::SkipUnclassifiable,
                    profile,
                    timestamp: None,
                    existing: None,
                });
                continue;
            }
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "file failed");
                failures.push(FailedFile::new(file.path.clone(), &err));
                continue;
            }
        };

        let destination = Destination {
            file_name: format!("{base}.{}", file.extension),
            dir,
        };
        match decide(&file, &destination, &base, &options.output, &claims) {
            Ok(None) => {
                claims.record(&destination, &base, &file);
                stats.planned += 1;
                actions.push(PlannedAction {
                    source: file,
                    destination: Some(destination),
                    kind: transfer,
                    profile,
                    timestamp: Some(timestamp),
                    existing: None,
                });
            }
            Ok(Some(existing)) => {
                debug!(
                    path = %file.path.display(),
                    existing = %existing.display(),
                    "already processed"
                );
                stats.already_processed += 1;
                actions.push(PlannedAction {
                    source: file,
                    destination: Some(destination),
                    kind: ActionKind::SkipAlreadyProcessed,
                    profile,
                    timestamp: Some(timestamp),
                    existing: Some(existing),
                });
            }
            Err(err) => {
                warn!(path = %file.path.display(), error = %err, "file failed");
                failures.push(FailedFile::new(file.path.clone(), &err));
            }
        }
    }

    stats.failed = failures.len();
    Ok(OrganizePlan {
        input: options.input.clone(),
        output: options.output.clone(),
        actions,
        failures,
        stats,
    })
}

/// Read, classify, resolve and name one file. Pure apart from reading.
fn prepare(
    file: &MediaFile,
    reader: &dyn MetadataReader,
    resolver: &TimestampResolver,
    options: &PlanOptions,
) -> Result<Prepared, ProcessError> {
    let metadata = reader.read(&file.path)?;
    debug!(path = %file.path.display(), tags = metadata.len(), "metadata read");

    let profile = classify(&metadata, &file.extension);
    debug!(path = %file.path.display(), ?profile, "classified");
    if profile == SourceProfile::Unknown && options.unknown_sources == UnknownSourcePolicy::Skip {
        return Ok(Prepared::Unclassifiable(profile));
    }

    let timestamp = resolver
        .resolve(&metadata, profile, &file.extension)
        .map_err(|err| ProcessError::NoReliableTimestamp {
            path: file.path.clone(),
            tried: err.tried_list(),
        })?;
    if timestamp.reliability == Reliability::Filesystem {
        warn!(
            path = %file.path.display(),
            instant = %timestamp.instant,
            "no embedded capture time; using filesystem modification time"
        );
    }

    let fields = DescriptiveFields::extract(&metadata, profile);
    let base = options.naming.build(&timestamp, profile, file.kind, &fields);
    let dir = plan_directory(&timestamp, file.kind);
    debug!(path = %file.path.display(), dir = %dir.display(), %base, "planned");

    Ok(Prepared::Ready {
        profile,
        timestamp,
        dir,
        base,
    })
}

/// `Ok(Some(existing))` when the file is already organized, `Ok(None)` when
/// the destination is free.
fn decide(
    file: &MediaFile,
    destination: &Destination,
    base: &str,
    output: &Path,
    claims: &Claims,
) -> Result<Option<PathBuf>, ProcessError> {
    let io_error = |source: std::io::Error| ProcessError::FilesystemExecution {
        path: file.path.clone(),
        source,
    };

    let dir = output.join(&destination.dir);
    match inspect_destination(&file.path, &dir, base, &file.extension).map_err(io_error)? {
        Occupant::Identical(existing) => return Ok(Some(existing)),
        Occupant::Conflicting(existing) => {
            return Err(ProcessError::NamingCollision {
                path: file.path.clone(),
                existing,
            })
        }
        Occupant::Vacant => {}
    }

    for claim in claims.get(destination, base) {
        if same_content(&file.path, &claim.source).map_err(io_error)? {
            return Ok(Some(output.join(&claim.target)));
        }
        if claim.extension == normalize_extension(&file.extension) {
            return Err(ProcessError::NamingCollision {
                path: file.path.clone(),
                existing: output.join(&claim.target),
            });
        }
    }

    Ok(None)
}

#[derive(Debug)]
struct Claim {
    source: PathBuf,
    target: PathBuf,
    extension: String,
}

/// Destinations taken earlier in the same batch, keyed by directory and stem.
#[derive(Debug, Default)]
struct Claims {
    by_stem: HashMap<(PathBuf, String), Vec<Claim>>,
}

impl Claims {
    fn get(&self, destination: &Destination, base: &str) -> &[Claim] {
        self.by_stem
            .get(&(destination.dir.clone(), base.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn record(&mut self, destination: &Destination, base: &str, file: &MediaFile) {
        self.by_stem
            .entry((destination.dir.clone(), base.to_string()))
            .or_default()
            .push(Claim {
                source: file.path.clone(),
                target: destination.relative_path(),
                extension: normalize_extension(&file.extension),
            });
    }
}

fn collect_media_files(
    root: &Path,
    recursive: bool,
    include_hidden: bool,
    stats: &mut PlanStats,
) -> Result<Vec<MediaFile>> {
    let mut paths = Vec::new();

    if recursive {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                include_hidden
                    || entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !is_hidden(entry.path())
            });
        for entry in walker {
            let entry =
                entry.with_context(|| format!("フォルダ走査に失敗しました: {}", root.display()))?;
            if entry.file_type().is_dir() {
                continue;
            }
            paths.push(entry.into_path());
        }
    } else {
        for entry in fs::read_dir(root)
            .with_context(|| format!("フォルダを読めませんでした: {}", root.display()))?
        {
            let entry =
                entry.with_context(|| format!("エントリ読み取り失敗: {}", root.display()))?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        stats.scanned_files += 1;
        if is_hidden(&path) && !include_hidden {
            stats.skipped_hidden += 1;
            continue;
        }
        let Some(file) = MediaFile::from_path(&path) else {
            stats.skipped_unsupported += 1;
            continue;
        };
        stats.media_files += 1;
        out.push(file);
    }

    Ok(out)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
