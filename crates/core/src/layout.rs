use crate::metadata::{normalize_extension, MediaKind};
use crate::timestamp::ResolvedTimestamp;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

pub const PHOTOS_DIR: &str = "photos";
pub const VIDEOS_DIR: &str = "videos";

/// `photos|videos/YYYY/YYYY-MM/YYYY-MM-DD`, relative to the output root.
pub fn plan_directory(timestamp: &ResolvedTimestamp, kind: MediaKind) -> PathBuf {
    let root = match kind {
        MediaKind::Photo => PHOTOS_DIR,
        MediaKind::Video => VIDEOS_DIR,
    };
    let instant = &timestamp.instant;
    Path::new(root)
        .join(instant.format("%Y").to_string())
        .join(instant.format("%Y-%m").to_string())
        .join(instant.format("%Y-%m-%d").to_string())
}

/// Files in `dir` whose stem is exactly `base`, sorted. A missing directory
/// has no matches.
pub fn find_processed(dir: &Path, base: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let stem_matches = path
            .file_stem()
            .map(|stem| stem.to_string_lossy() == base)
            .unwrap_or(false);
        if stem_matches {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

pub fn already_processed(dir: &Path, base: &str) -> io::Result<bool> {
    Ok(!find_processed(dir, base)?.is_empty())
}

/// SHA-256 of a file, hex encoded.
pub fn content_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Byte-identical check: size first, hash only when sizes agree.
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(content_hash(a)? == content_hash(b)?)
}

/// What already occupies a destination stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupant {
    Vacant,
    /// Same bytes as the source; the file was organized before.
    Identical(PathBuf),
    /// Different bytes under the same name and extension.
    Conflicting(PathBuf),
}

/// Inspects `dir` for files named `base.*` relative to `source`.
/// Matches that differ from the source only by extension are not conflicts.
pub fn inspect_destination(
    source: &Path,
    dir: &Path,
    base: &str,
    extension: &str,
) -> io::Result<Occupant> {
    let matches = find_processed(dir, base)?;
    if matches.is_empty() {
        return Ok(Occupant::Vacant);
    }

    for existing in &matches {
        if same_content(source, existing)? {
            return Ok(Occupant::Identical(existing.clone()));
        }
    }

    let wanted = normalize_extension(extension);
    let conflicting = matches.into_iter().find(|existing| {
        existing
            .extension()
            .map(|ext| normalize_extension(&ext.to_string_lossy()) == wanted)
            .unwrap_or(wanted.is_empty())
    });
    Ok(conflicting.map_or(Occupant::Vacant, Occupant::Conflicting))
}
