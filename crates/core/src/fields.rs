use crate::metadata::{RawMetadata, Tag};
use crate::profile::SourceProfile;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Lens codes reported by the Mavic 3 Pro cameras and their 35mm equivalents.
const MAVIC_LENS_FOCALS: &[(&str, u32)] = &[("L2D-20c", 24), ("FC4382", 70), ("FC4370", 166)];

/// `DJI_YYYYMMDDHHMMSS_0001_D.JPG` and the older `DJI_0001.JPG`.
static DJI_SEQUENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^DJI_(?:\d{14}_)?(?P<seq>\d{4})(?:_|\.|$)").expect("valid regex")
});

/// Naming inputs besides the timestamp and label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptiveFields {
    pub focal_length_mm: Option<u32>,
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub duration_secs: Option<u64>,
    pub make: Option<String>,
    pub model: Option<String>,
    /// Camera body actuation count.
    pub shutter_count: Option<u64>,
    /// Per-flight counter from the DJI filename.
    pub sequence: Option<String>,
}

impl DescriptiveFields {
    pub fn extract(metadata: &RawMetadata, profile: SourceProfile) -> Self {
        Self {
            focal_length_mm: focal_length(metadata, profile),
            resolution: resolution(metadata),
            fps: metadata
                .get(Tag::VideoFrameRate)
                .and_then(parse_number)
                .filter(|v| *v > 0.0)
                .map(|v| v.round() as u32),
            duration_secs: metadata.get(Tag::Duration).and_then(parse_duration),
            make: metadata.get(Tag::Make).map(str::to_string),
            model: metadata.get(Tag::Model).map(str::to_string),
            shutter_count: metadata
                .get(Tag::ShutterCount)
                .and_then(|v| v.trim().parse::<u64>().ok()),
            sequence: metadata.get(Tag::FileName).and_then(dji_sequence),
        }
    }

    /// Zero-padded to six digits.
    pub fn shutter_count_text(&self) -> Option<String> {
        self.shutter_count.map(|count| format!("{count:06}"))
    }

    pub fn focal_length_text(&self) -> Option<String> {
        self.focal_length_mm.map(|mm| format!("{mm}mm"))
    }

    pub fn fps_text(&self) -> Option<String> {
        self.fps.map(|fps| format!("{fps}p"))
    }

    /// `MMmSSs`; minutes keep growing past 59.
    pub fn duration_text(&self) -> Option<String> {
        self.duration_secs
            .map(|secs| format!("{:02}m{:02}s", secs / 60, secs % 60))
    }
}

fn focal_length(metadata: &RawMetadata, profile: SourceProfile) -> Option<u32> {
    let equivalent = metadata
        .get(Tag::FocalLength35mm)
        .and_then(parse_number)
        .filter(|v| *v > 0.0);
    if let Some(mm) = equivalent {
        return Some(mm.round() as u32);
    }

    if profile == SourceProfile::DjiMavic3Pro {
        if let Some(model) = metadata.get(Tag::Model) {
            let code = MAVIC_LENS_FOCALS
                .iter()
                .find(|(code, _)| model.to_ascii_lowercase().contains(&code.to_ascii_lowercase()));
            if let Some((_, mm)) = code {
                return Some(*mm);
            }
        }
    }

    metadata
        .get(Tag::FocalLength)
        .and_then(parse_number)
        .filter(|v| *v > 0.0)
        .map(|v| v.round() as u32)
}

fn dji_sequence(file_name: &str) -> Option<String> {
    DJI_SEQUENCE
        .captures(file_name)
        .and_then(|caps| caps.name("seq"))
        .map(|m| m.as_str().to_string())
}

fn resolution(metadata: &RawMetadata) -> Option<String> {
    let dims = match (
        metadata.get(Tag::ImageWidth).and_then(parse_number),
        metadata.get(Tag::ImageHeight).and_then(parse_number),
    ) {
        (Some(w), Some(h)) => Some((w, h)),
        _ => metadata.get(Tag::ImageSize).and_then(parse_image_size),
    };
    let (width, height) = dims?;
    let short_side = width.min(height).round() as u32;
    if short_side == 0 {
        return None;
    }
    Some(resolution_label(short_side))
}

pub fn resolution_label(short_side: u32) -> String {
    match short_side {
        2160 => "4K".to_string(),
        1080 => "FHD".to_string(),
        720 => "HD".to_string(),
        other => format!("{other}p"),
    }
}

/// `3840x2160` or `3840 2160`.
fn parse_image_size(value: &str) -> Option<(f64, f64)> {
    let mut parts = value
        .split(|c: char| c == 'x' || c == 'X' || c.is_whitespace())
        .filter(|p| !p.is_empty());
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Leading numeric part of values like `24.0`, `24.0 mm` or `59.94 fps`.
fn parse_number(value: &str) -> Option<f64> {
    let head = value.split_whitespace().next()?;
    let head = head.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    head.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Seconds (`84.2`, `84.2 s`) or clock text (`0:01:24`, `1:24`), floored.
pub fn parse_duration(value: &str) -> Option<u64> {
    let trimmed = value.trim();
    if trimmed.contains(':') {
        let mut total = 0.0;
        for part in trimmed.split(':') {
            let unit = part.trim().parse::<f64>().ok()?;
            if unit < 0.0 {
                return None;
            }
            total = total * 60.0 + unit;
        }
        return Some(total.floor() as u64);
    }
    parse_number(trimmed)
        .filter(|v| *v >= 0.0)
        .map(|v| v.floor() as u64)
}
