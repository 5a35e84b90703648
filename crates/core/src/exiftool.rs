use crate::error::ProcessError;
use crate::metadata::{MetadataReader, RawMetadata};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub const DEFAULT_EXIFTOOL: &str = "exiftool";

/// Reads metadata by running ExifTool once per file.
#[derive(Debug, Clone)]
pub struct ExifToolReader {
    program: PathBuf,
}

impl Default for ExifToolReader {
    fn default() -> Self {
        Self::new(DEFAULT_EXIFTOOL)
    }
}

impl ExifToolReader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-ver")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl MetadataReader for ExifToolReader {
    fn read(&self, path: &Path) -> Result<RawMetadata, ProcessError> {
        // -G1: family 1 group names, -a: keep duplicates, -n: numeric values
        let output = Command::new(&self.program)
            .args(["-json", "-G1", "-a", "-n"])
            .arg(path)
            .output()
            .map_err(|err| {
                ProcessError::metadata_unavailable(
                    path,
                    format!("{} を起動できませんでした: {err}", self.program.display()),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProcessError::metadata_unavailable(path, stderr.trim()));
        }

        let metadata = parse_exiftool_json(&output.stdout)
            .map_err(|reason| ProcessError::metadata_unavailable(path, reason))?;
        debug!(path = %path.display(), tags = metadata.len(), "metadata read");
        Ok(metadata)
    }
}

pub fn exiftool_available() -> bool {
    ExifToolReader::default().is_available()
}

fn parse_exiftool_json(stdout: &[u8]) -> Result<RawMetadata, String> {
    let parsed: Value = serde_json::from_slice(stdout)
        .map_err(|err| format!("ExifToolの出力を解析できませんでした: {err}"))?;
    let object = parsed
        .as_array()
        .and_then(|items| items.first())
        .and_then(Value::as_object)
        .ok_or_else(|| "ExifToolの出力が空です".to_string())?;

    let metadata = RawMetadata::from_extractor_map(object);
    if metadata.is_empty() {
        return Err("認識できるタグがありません".to_string());
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Tag;

    #[test]
    fn parses_first_object_of_json_array() {
        let stdout = br#"[{
            "SourceFile": "/in/DJI_20250604153000_0001_D.JPG",
            "System:FileName": "DJI_20250604153000_0001_D.JPG",
            "IFD0:Make": "Hasselblad",
            "IFD0:Model": "L2D-20c",
            "ExifIFD:DateTimeOriginal": "2025:06:04 15:30:00"
        }]"#;
        let meta = parse_exiftool_json(stdout).expect("must parse");
        assert_eq!(meta.get(Tag::Make), Some("Hasselblad"));
        assert_eq!(meta.get(Tag::Model), Some("L2D-20c"));
    }

    #[test]
    fn rejects_garbage_and_empty_output() {
        assert!(parse_exiftool_json(b"not json").is_err());
        assert!(parse_exiftool_json(b"[]").is_err());
        assert!(parse_exiftool_json(br#"[{"SourceFile": "/in/x"}]"#).is_err());
    }

    #[test]
    fn missing_program_is_metadata_unavailable() {
        let reader = ExifToolReader::new("/nonexistent/exiftool-binary");
        let err = reader
            .read(Path::new("/in/DSC00001.ARW"))
            .expect_err("spawn must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::MetadataUnavailable);
        assert!(!reader.is_available());
    }
}
