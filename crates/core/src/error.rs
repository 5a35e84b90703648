use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MetadataUnavailable,
    NoReliableTimestamp,
    NamingCollision,
    FilesystemExecutionError,
}

/// Failure of a single file. Never aborts the batch.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("メタデータを取得できませんでした: {path}: {reason}")]
    MetadataUnavailable { path: PathBuf, reason: String },
    #[error("信頼できる撮影日時が見つかりませんでした: {path} (確認したタグ: {tried})")]
    NoReliableTimestamp { path: PathBuf, tried: String },
    #[error("出力先に内容の異なる同名ファイルがあります: {path} -> {existing}")]
    NamingCollision { path: PathBuf, existing: PathBuf },
    #[error("ファイル操作に失敗しました: {path}: {source}")]
    FilesystemExecution {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MetadataUnavailable { .. } => ErrorKind::MetadataUnavailable,
            Self::NoReliableTimestamp { .. } => ErrorKind::NoReliableTimestamp,
            Self::NamingCollision { .. } => ErrorKind::NamingCollision,
            Self::FilesystemExecution { .. } => ErrorKind::FilesystemExecutionError,
        }
    }

    pub fn metadata_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MetadataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Serializable record of a failed file for reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailedFile {
    pub fn new(path: PathBuf, err: &ProcessError) -> Self {
        Self {
            path,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_file_carries_kind_and_message() {
        let err = ProcessError::NamingCollision {
            path: PathBuf::from("/in/a.jpg"),
            existing: PathBuf::from("/out/a.jpg"),
        };
        let failed = FailedFile::new(PathBuf::from("/in/a.jpg"), &err);
        assert_eq!(failed.kind, ErrorKind::NamingCollision);
        assert!(failed.message.contains("/out/a.jpg"));
    }
}
