use crate::exif_reader::ExifReader;
use crate::exiftool::{ExifToolReader, DEFAULT_EXIFTOOL};
use crate::metadata::MetadataReader;
use crate::template::{NamingConfig, NamingTemplates};
use crate::timestamp::TimeZoneSetting;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    #[default]
    Exiftool,
    /// Built-in EXIF parsing, still images only.
    Exif,
}

/// What to do with files no known profile matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSourcePolicy {
    /// Organize under the coarse kind with a make/model label.
    #[default]
    Route,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub timezone: String,
    pub recursive_default: bool,
    pub include_hidden_default: bool,
    /// 0 uses one worker per CPU.
    pub workers: usize,
    pub metadata_backend: MetadataBackend,
    pub exiftool_path: PathBuf,
    pub unknown_sources: UnknownSourcePolicy,
    pub filesystem_fallback: bool,
    pub naming: NamingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: "local".to_string(),
            recursive_default: false,
            include_hidden_default: false,
            workers: 0,
            metadata_backend: MetadataBackend::default(),
            exiftool_path: PathBuf::from(DEFAULT_EXIFTOOL),
            unknown_sources: UnknownSourcePolicy::default(),
            filesystem_fallback: true,
            naming: NamingConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn timezone_setting(&self) -> Result<TimeZoneSetting> {
        self.timezone
            .parse::<TimeZoneSetting>()
            .context("設定のタイムゾーンが不正です")
    }

    pub fn naming_templates(&self) -> Result<NamingTemplates> {
        NamingTemplates::parse(&self.naming).context("命名テンプレートが不正です")
    }

    pub fn metadata_reader(&self) -> Box<dyn MetadataReader> {
        match self.metadata_backend {
            MetadataBackend::Exiftool => Box::new(ExifToolReader::new(&self.exiftool_path)),
            MetadataBackend::Exif => Box::new(ExifReader),
        }
    }

    /// Checks everything that would otherwise fail only once a batch starts.
    pub fn validate(&self) -> Result<()> {
        self.timezone_setting()?;
        self.naming_templates()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "mediasort", "mediasort")
        .context("OS標準設定ディレクトリを取得できませんでした")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

/// Missing file means defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("設定ファイルを読めませんでした: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw)
        .with_context(|| format!("設定ファイルのパースに失敗しました: {}", path.display()))?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let paths = app_paths()?;
    save_config_to(config, &paths.config_path)?;
    Ok(paths.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| {
            format!("設定ディレクトリを作成できませんでした: {}", dir.display())
        })?;
    }
    let body = toml::to_string_pretty(config).context("設定のシリアライズに失敗しました")?;
    fs::write(path, body)
        .with_context(|| format!("設定ファイルを書き込めませんでした: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("config.toml")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.timezone_setting().expect("tz"), TimeZoneSetting::Local);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "timezone = \"Asia/Tokyo\"\nunknown_sources = \"skip\"\n\n[naming]\nphoto = \"{date}-{label}\"\n",
        )
        .expect("write");

        let config = load_config_from(&path).expect("parse");
        assert_eq!(config.unknown_sources, UnknownSourcePolicy::Skip);
        assert_eq!(config.metadata_backend, MetadataBackend::Exiftool);
        assert_eq!(config.naming.photo, "{date}-{label}");
        assert_eq!(config.naming.video, NamingConfig::default().video);
        assert!(config.filesystem_fallback);
        config.validate().expect("valid");
    }

    #[test]
    fn save_then_load_preserves_values() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let config = AppConfig {
            workers: 4,
            metadata_backend: MetadataBackend::Exif,
            ..AppConfig::default()
        };
        save_config_to(&config, &path).expect("save");
        assert_eq!(load_config_from(&path).expect("load"), config);
    }

    #[test]
    fn invalid_values_fail_validation() {
        let bad_tz = AppConfig {
            timezone: "Nowhere/Land".to_string(),
            ..AppConfig::default()
        };
        assert!(bad_tz.validate().is_err());

        let mut bad_template = AppConfig::default();
        bad_template.naming.video = "{date}-{orig_name}".to_string();
        assert!(bad_template.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "workers = \"many\"").expect("write");
        assert!(load_config_from(&path).is_err());
    }
}
