use crate::error::ProcessError;
use crate::metadata::{normalize, MediaKind, MetadataReader, RawMetadata, Tag};
use chrono::{DateTime, Local};
use exif::Reader;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Built-in EXIF reader for still images, used when ExifTool is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifReader;

impl MetadataReader for ExifReader {
    fn read(&self, path: &Path) -> Result<RawMetadata, ProcessError> {
        let ext = path
            .extension()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        if MediaKind::from_extension(&ext) != Some(MediaKind::Photo) {
            return Err(ProcessError::metadata_unavailable(
                path,
                "内蔵EXIFリーダーは静止画のみ対応しています",
            ));
        }

        read_exif_metadata(path)
    }
}

pub fn read_exif_metadata(path: &Path) -> Result<RawMetadata, ProcessError> {
    let file = File::open(path).map_err(|err| {
        ProcessError::metadata_unavailable(path, format!("EXIF読み込み対象を開けませんでした: {err}"))
    })?;
    let mut buf = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut buf).map_err(|err| {
        ProcessError::metadata_unavailable(path, format!("EXIFを解析できませんでした: {err}"))
    })?;

    let mut pairs = vec![
        (Tag::Make, find_field_value(&exif, &["Make"])),
        (Tag::Model, find_field_value(&exif, &["Model"])),
        (Tag::LensModel, find_field_value(&exif, &["LensModel"])),
        (Tag::DateTimeOriginal, find_field_value(&exif, &["DateTimeOriginal"])),
        (Tag::OffsetTimeOriginal, find_field_value(&exif, &["OffsetTimeOriginal"])),
        (Tag::CreateDate, find_field_value(&exif, &["DateTimeDigitized"])),
        (Tag::ModifyDate, find_field_value(&exif, &["DateTime"])),
        (Tag::FocalLength, find_raw_number(&exif, &["FocalLength"])),
        (
            Tag::FocalLength35mm,
            find_raw_number(&exif, &["FocalLengthIn35mmFilm"]),
        ),
        (Tag::ImageWidth, find_raw_number(&exif, &["PixelXDimension"])),
        (Tag::ImageHeight, find_raw_number(&exif, &["PixelYDimension"])),
    ];

    pairs.push((
        Tag::FileName,
        path.file_name().map(|v| v.to_string_lossy().to_string()),
    ));
    pairs.push((Tag::FileModifyDate, file_modified(path)));

    Ok(pairs
        .into_iter()
        .filter_map(|(tag, value)| normalize(value).map(|v| (tag, v)))
        .collect())
}

fn find_field_value(exif: &exif::Exif, names: &[&str]) -> Option<String> {
    exif.fields().find_map(|field| {
        let tag_name = format!("{:?}", field.tag);
        if names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&tag_name))
        {
            Some(field.display_value().to_string().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// Numeric fields without unit text, so they read the same as `exiftool -n`.
fn find_raw_number(exif: &exif::Exif, names: &[&str]) -> Option<String> {
    exif.fields().find_map(|field| {
        let tag_name = format!("{:?}", field.tag);
        if !names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&tag_name))
        {
            return None;
        }
        match &field.value {
            exif::Value::Rational(values) => values.first().map(|r| r.to_f64().to_string()),
            _ => field.value.get_uint(0).map(|v| v.to_string()),
        }
    })
}

fn file_modified(path: &Path) -> Option<String> {
    let time = fs::metadata(path).ok()?.modified().ok()?;
    let local: DateTime<Local> = DateTime::from(time);
    Some(local.format("%Y:%m:%d %H:%M:%S%:z").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fields::DescriptiveFields;
    use crate::profile::{classify, SourceProfile};
    use crate::timestamp::{TimestampResolver, TimestampSource};
    use chrono::Timelike;
    use tempfile::tempdir;

    type Entry = (u16, u16, u32, Vec<u8>);

    fn ascii(tag: u16, text: &str) -> Entry {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        (tag, 2, data.len() as u32, data)
    }

    fn short(tag: u16, value: u16) -> Entry {
        (tag, 3, 1, value.to_le_bytes().to_vec())
    }

    fn long(tag: u16, value: u32) -> Entry {
        (tag, 4, 1, value.to_le_bytes().to_vec())
    }

    fn rational(tag: u16, num: u32, denom: u32) -> Entry {
        let mut data = num.to_le_bytes().to_vec();
        data.extend(denom.to_le_bytes());
        (tag, 5, 1, data)
    }

    /// Appends one little-endian IFD; offsets are relative to the TIFF header.
    fn write_ifd(out: &mut Vec<u8>, entries: &[Entry]) {
        let data_start = out.len() + 2 + 12 * entries.len() + 4;
        let mut table = (entries.len() as u16).to_le_bytes().to_vec();
        let mut data = Vec::new();
        for (tag, kind, count, bytes) in entries {
            table.extend(tag.to_le_bytes());
            table.extend(kind.to_le_bytes());
            table.extend(count.to_le_bytes());
            if bytes.len() <= 4 {
                let mut inline = bytes.clone();
                inline.resize(4, 0);
                table.extend(inline);
            } else {
                table.extend(((data_start + data.len()) as u32).to_le_bytes());
                data.extend(bytes);
                if data.len() % 2 == 1 {
                    data.push(0);
                }
            }
        }
        table.extend(0u32.to_le_bytes());
        out.extend(table);
        out.extend(data);
    }

    /// Minimal JPEG: SOI, APP1 Exif (IFD0 + Exif IFD), EOI.
    fn mavic_jpeg() -> Vec<u8> {
        let mut tiff = b"II*\0".to_vec();
        tiff.extend(8u32.to_le_bytes());

        let ifd0 = [
            ascii(0x010f, "Hasselblad"),
            ascii(0x0110, "L2D-20c"),
            long(0x8769, 0),
        ];
        let pointer_at = tiff.len() + 2 + 12 * 2 + 8;
        write_ifd(&mut tiff, &ifd0);
        let exif_ifd = tiff.len() as u32;
        tiff[pointer_at..pointer_at + 4].copy_from_slice(&exif_ifd.to_le_bytes());

        write_ifd(
            &mut tiff,
            &[
                ascii(0x9003, "2025:06:04 15:30:00"),
                ascii(0x9011, "+02:00"),
                rational(0x920a, 1229, 100),
                short(0xa405, 24),
            ],
        );

        let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
        jpeg.extend(((2 + 6 + tiff.len()) as u16).to_be_bytes());
        jpeg.extend(b"Exif\0\0");
        jpeg.extend(tiff);
        jpeg.extend([0xff, 0xd9]);
        jpeg
    }

    #[test]
    fn reads_capture_time_and_focal_length_from_jpeg() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("DJI_20250604153000_0001_D.JPG");
        fs::write(&path, mavic_jpeg()).expect("write");

        let meta = ExifReader.read(&path).expect("exif");
        assert_eq!(meta.get(Tag::Make), Some("Hasselblad"));
        assert_eq!(meta.get(Tag::OffsetTimeOriginal), Some("+02:00"));
        assert_eq!(meta.get(Tag::FocalLength), Some("12.29"));
        assert_eq!(meta.get(Tag::FocalLength35mm), Some("24"));

        let profile = classify(&meta, "jpg");
        assert_eq!(profile, SourceProfile::DjiMavic3Pro);

        let resolved = TimestampResolver::new("UTC".parse().expect("tz"))
            .resolve(&meta, profile, "jpg")
            .expect("timestamp");
        assert_eq!(resolved.source, TimestampSource::Tag(Tag::DateTimeOriginal));
        assert_eq!((resolved.instant.hour(), resolved.instant.minute()), (13, 30));

        let fields = DescriptiveFields::extract(&meta, profile);
        assert_eq!(fields.focal_length_mm, Some(24));
    }

    #[test]
    fn videos_are_rejected() {
        let err = ExifReader
            .read(Path::new("/in/C0001.MP4"))
            .expect_err("videos need exiftool");
        assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    }

    #[test]
    fn unreadable_jpeg_is_metadata_unavailable() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("broken.jpg");
        fs::write(&path, b"not a jpeg").expect("write");

        let err = ExifReader.read(&path).expect_err("no exif");
        assert_eq!(err.kind(), ErrorKind::MetadataUnavailable);
    }
}
