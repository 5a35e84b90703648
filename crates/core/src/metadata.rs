use crate::error::ProcessError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "dng", "arw"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4"];

/// Normalized metadata vocabulary. Extractor key names stop at this boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Tag {
    FileName,
    FileModifyDate,
    MimeType,
    Make,
    Model,
    DeviceManufacturer,
    DeviceModelName,
    ProductName,
    Encoder,
    LensId,
    LensModel,
    FocalLength,
    FocalLength35mm,
    DateTimeOriginal,
    SubSecDateTimeOriginal,
    OffsetTimeOriginal,
    CreateDate,
    ModifyDate,
    MediaCreateDate,
    TrackCreateDate,
    XmlCreationDate,
    XmlLastUpdate,
    ImageWidth,
    ImageHeight,
    ImageSize,
    VideoFrameRate,
    Duration,
    ShutterCount,
}

impl Tag {
    pub const ALL: &'static [Tag] = &[
        Tag::FileName,
        Tag::FileModifyDate,
        Tag::MimeType,
        Tag::Make,
        Tag::Model,
        Tag::DeviceManufacturer,
        Tag::DeviceModelName,
        Tag::ProductName,
        Tag::Encoder,
        Tag::LensId,
        Tag::LensModel,
        Tag::FocalLength,
        Tag::FocalLength35mm,
        Tag::DateTimeOriginal,
        Tag::SubSecDateTimeOriginal,
        Tag::OffsetTimeOriginal,
        Tag::CreateDate,
        Tag::ModifyDate,
        Tag::MediaCreateDate,
        Tag::TrackCreateDate,
        Tag::XmlCreationDate,
        Tag::XmlLastUpdate,
        Tag::ImageWidth,
        Tag::ImageHeight,
        Tag::ImageSize,
        Tag::VideoFrameRate,
        Tag::Duration,
        Tag::ShutterCount,
    ];

    /// Grouped extractor keys (`Group:Name`), most specific first.
    fn extractor_keys(self) -> &'static [&'static str] {
        match self {
            Tag::FileName => &["System:FileName", "File:FileName"],
            Tag::FileModifyDate => &["System:FileModifyDate", "File:FileModifyDate"],
            Tag::MimeType => &["File:MIMEType"],
            Tag::Make => &["IFD0:Make", "UserData:Make", "Keys:Make", "QuickTime:Make"],
            Tag::Model => &["IFD0:Model", "UserData:Model", "Keys:Model", "QuickTime:Model"],
            Tag::DeviceManufacturer => &["XML:DeviceManufacturer"],
            Tag::DeviceModelName => &["XML:DeviceModelName"],
            Tag::ProductName => &[],
            Tag::Encoder => &["QuickTime:Encoder", "UserData:Encoder", "Keys:Encoder"],
            Tag::LensId => &["Composite:LensID"],
            Tag::LensModel => &["ExifIFD:LensModel"],
            Tag::FocalLength => &["ExifIFD:FocalLength"],
            Tag::FocalLength35mm => &["ExifIFD:FocalLengthIn35mmFormat"],
            Tag::DateTimeOriginal => &["ExifIFD:DateTimeOriginal"],
            Tag::SubSecDateTimeOriginal => &["Composite:SubSecDateTimeOriginal"],
            Tag::OffsetTimeOriginal => &["ExifIFD:OffsetTimeOriginal"],
            Tag::CreateDate => &["ExifIFD:CreateDate", "QuickTime:CreateDate"],
            Tag::ModifyDate => &["IFD0:ModifyDate", "QuickTime:ModifyDate"],
            Tag::MediaCreateDate => &["Track1:MediaCreateDate", "QuickTime:MediaCreateDate"],
            Tag::TrackCreateDate => &["Track1:TrackCreateDate", "QuickTime:TrackCreateDate"],
            Tag::XmlCreationDate => &["XML:CreationDateValue"],
            Tag::XmlLastUpdate => &["XML:LastUpdate"],
            Tag::ImageWidth => &[
                "Track1:ImageWidth",
                "QuickTime:ImageWidth",
                "XML:VideoFormatVideoLayoutPixel",
                "File:ImageWidth",
                "ExifIFD:ExifImageWidth",
            ],
            Tag::ImageHeight => &[
                "Track1:ImageHeight",
                "QuickTime:ImageHeight",
                "XML:VideoFormatVideoLayoutNumOfVerticalLine",
                "File:ImageHeight",
                "ExifIFD:ExifImageHeight",
            ],
            Tag::ImageSize => &["Composite:ImageSize"],
            Tag::VideoFrameRate => &[
                "Track1:VideoFrameRate",
                "QuickTime:VideoFrameRate",
                "XML:VideoFormatVideoFrameCaptureFps",
                "XML:VideoFormatVideoFrameFormatFps",
            ],
            Tag::Duration => &["QuickTime:Duration", "Track1:TrackDuration", "Composite:Duration"],
            Tag::ShutterCount => &[
                "Sony:ShutterCount",
                "Sony:ShutterCount2",
                "Sony:ShutterCount3",
            ],
        }
    }

    /// Ungrouped tag name used when none of the grouped keys is present.
    pub fn bare_name(self) -> &'static str {
        match self {
            Tag::FileName => "FileName",
            Tag::FileModifyDate => "FileModifyDate",
            Tag::MimeType => "MIMEType",
            Tag::Make => "Make",
            Tag::Model => "Model",
            Tag::DeviceManufacturer => "DeviceManufacturer",
            Tag::DeviceModelName => "DeviceModelName",
            Tag::ProductName => "ProductName",
            Tag::Encoder => "Encoder",
            Tag::LensId => "LensID",
            Tag::LensModel => "LensModel",
            Tag::FocalLength => "FocalLength",
            Tag::FocalLength35mm => "FocalLengthIn35mmFormat",
            Tag::DateTimeOriginal => "DateTimeOriginal",
            Tag::SubSecDateTimeOriginal => "SubSecDateTimeOriginal",
            Tag::OffsetTimeOriginal => "OffsetTimeOriginal",
            Tag::CreateDate => "CreateDate",
            Tag::ModifyDate => "ModifyDate",
            Tag::MediaCreateDate => "MediaCreateDate",
            Tag::TrackCreateDate => "TrackCreateDate",
            Tag::XmlCreationDate => "CreationDateValue",
            Tag::XmlLastUpdate => "LastUpdate",
            Tag::ImageWidth => "ImageWidth",
            Tag::ImageHeight => "ImageHeight",
            Tag::ImageSize => "ImageSize",
            Tag::VideoFrameRate => "VideoFrameRate",
            Tag::Duration => "Duration",
            Tag::ShutterCount => "ShutterCount",
        }
    }
}

/// Metadata of one file, keyed by the normalized vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetadata {
    values: BTreeMap<Tag, String>,
}

impl RawMetadata {
    /// Normalizes one object of extractor JSON output (`Group:Name` keys).
    pub fn from_extractor_map(map: &Map<String, Value>) -> Self {
        let mut by_bare_name = BTreeMap::<&str, Vec<&Value>>::new();
        for (key, value) in map {
            let bare = key.rsplit(':').next().unwrap_or(key.as_str());
            by_bare_name.entry(bare).or_default().push(value);
        }

        let mut values = BTreeMap::new();
        for &tag in Tag::ALL {
            let grouped = tag
                .extractor_keys()
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(value_to_string);
            let found = grouped.or_else(|| {
                by_bare_name
                    .get(tag.bare_name())
                    .and_then(|candidates| candidates.iter().copied().find_map(value_to_string))
            });
            if let Some(value) = found {
                values.insert(tag, value);
            }
        }

        Self { values }
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.values.get(&tag).map(String::as_str)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.values.contains_key(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &str)> {
        self.values.iter().map(|(tag, value)| (*tag, value.as_str()))
    }
}

impl<S: Into<String>> FromIterator<(Tag, S)> for RawMetadata {
    fn from_iter<I: IntoIterator<Item = (Tag, S)>>(iter: I) -> Self {
        let values = iter
            .into_iter()
            .filter_map(|(tag, value)| normalize(Some(value.into())).map(|v| (tag, v)))
            .collect();
        Self { values }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Object(_) => return None,
    };
    normalize(Some(raw))
}

pub(crate) fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// `None` for extensions outside the supported set.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let ext = extension.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lowercase, without the dot, `jpeg` folded into `jpg`.
    pub extension: String,
    pub kind: MediaKind,
}

impl MediaFile {
    /// `None` when the extension is not a supported photo or video type.
    pub fn from_path(path: &Path) -> Option<Self> {
        let raw_ext = path
            .extension()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        Some(Self {
            path: path.to_path_buf(),
            extension: normalize_extension(&raw_ext),
            kind: MediaKind::from_extension(&raw_ext)?,
        })
    }
}

pub fn normalize_extension(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "jpeg" => "jpg".to_string(),
        _ => ext,
    }
}

/// Produces normalized metadata for one file.
pub trait MetadataReader: Sync {
    fn read(&self, path: &Path) -> Result<RawMetadata, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grouped_keys_win_over_bare_names() {
        let value = json!({
            "SourceFile": "/in/DSC00001.ARW",
            "System:FileName": "DSC00001.ARW",
            "IFD0:Make": "SONY",
            "IFD0:Model": "ILCE-7M4",
            "XMP-tiff:Make": "Other",
            "ExifIFD:DateTimeOriginal": "2025:06:04 15:30:00",
            "ExifIFD:FocalLength": 35.0,
        });
        let meta = RawMetadata::from_extractor_map(value.as_object().expect("object"));

        assert_eq!(meta.get(Tag::Make), Some("SONY"));
        assert_eq!(meta.get(Tag::Model), Some("ILCE-7M4"));
        assert_eq!(meta.get(Tag::FileName), Some("DSC00001.ARW"));
        assert_eq!(meta.get(Tag::DateTimeOriginal), Some("2025:06:04 15:30:00"));
        assert_eq!(meta.get(Tag::FocalLength), Some("35.0"));
    }

    #[test]
    fn bare_name_fallback_covers_unlisted_groups() {
        let value = json!({
            "XMP-drone-dji:ProductName": "DJIMavic3Pro",
            "Track2:VideoFrameRate": 59.94,
        });
        let meta = RawMetadata::from_extractor_map(value.as_object().expect("object"));

        assert_eq!(meta.get(Tag::ProductName), Some("DJIMavic3Pro"));
        assert_eq!(meta.get(Tag::VideoFrameRate), Some("59.94"));
    }

    #[test]
    fn sony_shutter_count_falls_back_to_second_counter() {
        let value = json!({
            "Sony:ShutterCount2": 1011,
            "IFD0:Model": "ILCE-7M4",
        });
        let meta = RawMetadata::from_extractor_map(value.as_object().expect("object"));

        assert_eq!(meta.get(Tag::ShutterCount), Some("1011"));
    }

    #[test]
    fn empty_and_null_values_are_dropped() {
        let value = json!({
            "IFD0:Make": "   ",
            "IFD0:Model": null,
            "ExifIFD:LensModel": "FE 24-70mm F2.8 GM II",
        });
        let meta = RawMetadata::from_extractor_map(value.as_object().expect("object"));

        assert!(!meta.contains(Tag::Make));
        assert!(!meta.contains(Tag::Model));
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn media_file_normalizes_extension_and_kind() {
        let jpeg = MediaFile::from_path(Path::new("/in/DJI_0001.JPEG")).expect("jpeg");
        assert_eq!(jpeg.extension, "jpg");
        assert_eq!(jpeg.kind, MediaKind::Photo);

        let video = MediaFile::from_path(Path::new("/in/C0001.MP4")).expect("mp4");
        assert_eq!(video.extension, "mp4");
        assert_eq!(video.kind, MediaKind::Video);

        assert_eq!(MediaFile::from_path(Path::new("/in/notes.txt")), None);
    }
}
