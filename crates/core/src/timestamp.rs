use crate::metadata::{MediaKind, RawMetadata, Tag};
use crate::profile::SourceProfile;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneSetting {
    /// System default timezone.
    Local,
    Named(Tz),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("不明なタイムゾーンです: {0}")]
pub struct UnknownTimeZone(pub String);

impl FromStr for TimeZoneSetting {
    type Err = UnknownTimeZone;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        trimmed
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|_| UnknownTimeZone(trimmed.to_string()))
    }
}

impl fmt::Display for TimeZoneSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

impl TimeZoneSetting {
    /// Wall-clock time in this zone. Ambiguous times take the earlier instant;
    /// times skipped by a DST jump do not exist.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Local => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            Self::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }

    /// Same instant, expressed with this zone's offset.
    pub fn express(&self, instant: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => instant.with_timezone(&Local).fixed_offset(),
            Self::Named(tz) => instant.with_timezone(tz).fixed_offset(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimestampSource {
    Tag(Tag),
    /// Capture time encoded in the camera-assigned filename.
    FileName,
}

impl fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag.bare_name()),
            Self::FileName => f.write_str("FileName(stamp)"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reliability {
    Embedded,
    FileName,
    /// Derived from filesystem times, which change on copy.
    Filesystem,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedTimestamp {
    pub instant: DateTime<FixedOffset>,
    pub source: TimestampSource,
    pub reliability: Reliability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    Tag(Tag),
    /// Naive timestamp tag paired with the tag carrying its UTC offset.
    TagWithOffset(Tag, Tag),
    FileNameStamp,
}

impl Candidate {
    fn source(self) -> TimestampSource {
        match self {
            Candidate::Tag(tag) | Candidate::TagWithOffset(tag, _) => TimestampSource::Tag(tag),
            Candidate::FileNameStamp => TimestampSource::FileName,
        }
    }

    fn reliability(self) -> Reliability {
        match self {
            Candidate::Tag(Tag::FileModifyDate) => Reliability::Filesystem,
            Candidate::FileNameStamp => Reliability::FileName,
            _ => Reliability::Embedded,
        }
    }
}

use Candidate::{FileNameStamp, Tag as T, TagWithOffset as TO};

const SONY_STILL: &[Candidate] = &[
    T(Tag::SubSecDateTimeOriginal),
    TO(Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    TO(Tag::CreateDate, Tag::OffsetTimeOriginal),
    T(Tag::ModifyDate),
    T(Tag::FileModifyDate),
];

const SONY_VIDEO: &[Candidate] = &[
    T(Tag::XmlCreationDate),
    T(Tag::CreateDate),
    T(Tag::MediaCreateDate),
    T(Tag::TrackCreateDate),
    T(Tag::XmlLastUpdate),
    T(Tag::FileModifyDate),
];

const MAVIC_STILL: &[Candidate] = &[
    T(Tag::SubSecDateTimeOriginal),
    TO(Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    FileNameStamp,
    T(Tag::CreateDate),
    T(Tag::ModifyDate),
    T(Tag::FileModifyDate),
];

const MAVIC_VIDEO: &[Candidate] = &[
    FileNameStamp,
    T(Tag::CreateDate),
    T(Tag::MediaCreateDate),
    T(Tag::TrackCreateDate),
    T(Tag::FileModifyDate),
];

const RC_PRO_STILL: &[Candidate] = &[
    FileNameStamp,
    T(Tag::DateTimeOriginal),
    T(Tag::CreateDate),
    T(Tag::FileModifyDate),
];

const RC_PRO_VIDEO: &[Candidate] = &[
    FileNameStamp,
    T(Tag::CreateDate),
    T(Tag::MediaCreateDate),
    T(Tag::FileModifyDate),
];

const GENERIC_STILL: &[Candidate] = &[
    T(Tag::SubSecDateTimeOriginal),
    TO(Tag::DateTimeOriginal, Tag::OffsetTimeOriginal),
    TO(Tag::CreateDate, Tag::OffsetTimeOriginal),
    T(Tag::ModifyDate),
    T(Tag::FileModifyDate),
];

const GENERIC_VIDEO: &[Candidate] = &[
    T(Tag::CreateDate),
    T(Tag::MediaCreateDate),
    T(Tag::TrackCreateDate),
    T(Tag::FileModifyDate),
];

/// Ordered timestamp candidates for a profile and file extension.
/// Filesystem-derived candidates are always last.
pub fn precedence(profile: SourceProfile, extension: &str) -> &'static [Candidate] {
    let video = MediaKind::from_extension(extension) == Some(MediaKind::Video);
    match (profile, video) {
        (SourceProfile::SonyA7Iv, false) => SONY_STILL,
        (SourceProfile::SonyA7Iv, true) => SONY_VIDEO,
        (SourceProfile::DjiMavic3Pro, false) => MAVIC_STILL,
        (SourceProfile::DjiMavic3Pro, true) => MAVIC_VIDEO,
        (SourceProfile::DjiRcProScreenRecording, false) => RC_PRO_STILL,
        (SourceProfile::DjiRcProScreenRecording, true) => RC_PRO_VIDEO,
        (SourceProfile::Unknown, false) => GENERIC_STILL,
        (SourceProfile::Unknown, true) => GENERIC_VIDEO,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("使用できるタイムスタンプがありません")]
pub struct NoReliableTimestamp {
    pub tried: Vec<TimestampSource>,
}

impl NoReliableTimestamp {
    pub fn tried_list(&self) -> String {
        self.tried
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimestampResolver {
    pub timezone: TimeZoneSetting,
    pub filesystem_fallback: bool,
}

impl TimestampResolver {
    pub fn new(timezone: TimeZoneSetting) -> Self {
        Self {
            timezone,
            filesystem_fallback: true,
        }
    }

    pub fn resolve(
        &self,
        metadata: &RawMetadata,
        profile: SourceProfile,
        extension: &str,
    ) -> Result<ResolvedTimestamp, NoReliableTimestamp> {
        let mut tried = Vec::new();

        for &candidate in precedence(profile, extension) {
            if candidate.reliability() == Reliability::Filesystem && !self.filesystem_fallback {
                continue;
            }
            tried.push(candidate.source());

            let Some(instant) = self.evaluate(candidate, metadata) else {
                continue;
            };
            debug!(source = %candidate.source(), %instant, "timestamp resolved");
            return Ok(ResolvedTimestamp {
                instant: self.timezone.express(&instant),
                source: candidate.source(),
                reliability: candidate.reliability(),
            });
        }

        Err(NoReliableTimestamp { tried })
    }

    fn evaluate(&self, candidate: Candidate, metadata: &RawMetadata) -> Option<DateTime<FixedOffset>> {
        let (parsed, offset) = match candidate {
            Candidate::Tag(tag) => (parse_timestamp(metadata.get(tag)?)?, None),
            Candidate::TagWithOffset(tag, offset_tag) => (
                parse_timestamp(metadata.get(tag)?)?,
                metadata.get(offset_tag).and_then(parse_offset),
            ),
            Candidate::FileNameStamp => (
                ParsedTimestamp::Naive(filename_stamp(metadata.get(Tag::FileName)?)?),
                None,
            ),
        };

        match (parsed, offset) {
            (ParsedTimestamp::Instant(instant), _) => Some(instant),
            (ParsedTimestamp::Naive(naive), Some(offset)) => {
                offset.from_local_datetime(&naive).single()
            }
            (ParsedTimestamp::Naive(naive), None) => self.timezone.localize(&naive),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    Instant(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

/// Parses `YYYY:MM:DD HH:MM:SS` style values with optional fraction and offset.
pub fn parse_timestamp(input: &str) -> Option<ParsedTimestamp> {
    let normalized = normalize_timestamp_text(input)?;

    let with_offset = [
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%z",
    ];
    for fmt in with_offset {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(ParsedTimestamp::Instant(dt));
        }
    }

    let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
    for fmt in naive {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(ParsedTimestamp::Naive(dt));
        }
    }

    None
}

fn normalize_timestamp_text(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if !trimmed.is_ascii() || trimmed.len() < 16 {
        return None;
    }

    let mut bytes = trimmed.as_bytes().to_vec();
    if bytes[4] == b':' && bytes[7] == b':' {
        bytes[4] = b'-';
        bytes[7] = b'-';
    }
    if bytes[10] == b'T' {
        bytes[10] = b' ';
    }
    let mut out = String::from_utf8(bytes).ok()?;
    if out.ends_with('Z') || out.ends_with('z') {
        out.pop();
        out.push_str("+00:00");
    }
    Some(out)
}

/// `+02:00`, `-0530`, `+09`.
pub fn parse_offset(input: &str) -> Option<FixedOffset> {
    let trimmed = input.trim();
    let (sign, rest) = match trimmed.as_bytes().first()? {
        b'+' => (1, &trimmed[1..]),
        b'-' => (-1, &trimmed[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (
            digits[..2].parse::<i32>().ok()?,
            digits[2..].parse::<i32>().ok()?,
        ),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

static DJI_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^DJI_(\d{4})(\d{2})(\d{2})(\d{2})(\d{2})(\d{2})(?:\D|$)")
        .expect("valid regex")
});
static SCREEN_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^screen-(\d{4})(\d{2})(\d{2})-(\d{2})(\d{2})(\d{2})(?:\D|$)")
        .expect("valid regex")
});
static GENERIC_STAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-_]?(\d{2})[-_]?(\d{2})[-_T]?(\d{2})[-_:]?(\d{2})[-_:]?(\d{2})")
        .expect("valid regex")
});

/// Most specific first. Each captures year, month, day, hour, minute, second.
static STAMP_PATTERNS: &[&LazyLock<Regex>] = &[&DJI_STAMP, &SCREEN_STAMP, &GENERIC_STAMP];

/// Capture time from camera filenames: `DJI_YYYYMMDDHHMMSS_…`,
/// `screen-YYYYMMDD-HHMMSS…`, then any `YYYYMMDD[-_]HHMMSS` run.
pub fn filename_stamp(file_name: &str) -> Option<NaiveDateTime> {
    STAMP_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(file_name)?;
        let digits: String = caps.iter().skip(1).flatten().map(|m| m.as_str()).collect();
        NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn meta(pairs: &[(Tag, &str)]) -> RawMetadata {
        pairs.iter().map(|(t, v)| (*t, *v)).collect()
    }

    fn utc() -> TimestampResolver {
        TimestampResolver::new("UTC".parse().expect("utc"))
    }

    #[test]
    fn parses_exif_iso_and_offset_forms() {
        assert!(matches!(
            parse_timestamp("2025:06:04 15:30:00"),
            Some(ParsedTimestamp::Naive(_))
        ));
        assert!(matches!(
            parse_timestamp("2025:06:04 15:30:00.123+02:00"),
            Some(ParsedTimestamp::Instant(_))
        ));
        assert!(matches!(
            parse_timestamp("2025-06-04T15:30:00Z"),
            Some(ParsedTimestamp::Instant(_))
        ));
        assert_eq!(parse_timestamp("0000:00:00 00:00:00"), None);
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("+02:00"), FixedOffset::east_opt(7200));
        assert_eq!(parse_offset("-0530"), FixedOffset::east_opt(-(5 * 3600 + 30 * 60)));
        assert_eq!(parse_offset("+09"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_offset("02:00"), None);
    }

    #[test]
    fn reads_dji_and_screen_filename_stamps() {
        let dji = filename_stamp("DJI_20250604153000_0001_D.JPG").expect("dji");
        assert_eq!((dji.hour(), dji.minute()), (15, 30));
        let screen = filename_stamp("screen-20250604-153012.mp4").expect("screen");
        assert_eq!(screen.second(), 12);
        assert_eq!(filename_stamp("DSC00001.ARW"), None);
        assert_eq!(filename_stamp("DJI_0001.JPG"), None);
    }

    #[test]
    fn reads_generic_date_time_runs() {
        let stamp = filename_stamp("20250604_153000.mp4").expect("generic");
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (2025, 6, 4));
        assert_eq!((stamp.hour(), stamp.minute(), stamp.second()), (15, 30, 0));

        let iso = filename_stamp("clip_2025-06-04T15-30-12.mp4").expect("separated");
        assert_eq!(iso.second(), 12);
        assert_eq!(filename_stamp("C0001.MP4"), None);
        assert_eq!(filename_stamp("20251399_999999.mp4"), None);
    }

    #[test]
    fn mavic_video_without_tags_uses_generic_stamp() {
        let m = meta(&[(Tag::FileName, "20250604_153000.mp4")]);
        let resolved = utc()
            .resolve(&m, SourceProfile::DjiMavic3Pro, "mp4")
            .expect("resolves");
        assert_eq!(resolved.source, TimestampSource::FileName);
        assert_eq!(resolved.instant.hour(), 15);
    }

    #[test]
    fn raw_prefers_embedded_capture_over_file_modify_date() {
        let m = meta(&[
            (Tag::FileModifyDate, "2025:07:01 09:00:00+00:00"),
            (Tag::DateTimeOriginal, "2025:06:04 15:30:00"),
        ]);
        let resolved = utc()
            .resolve(&m, SourceProfile::SonyA7Iv, "arw")
            .expect("resolves");
        assert_eq!(resolved.source, TimestampSource::Tag(Tag::DateTimeOriginal));
        assert_eq!(resolved.reliability, Reliability::Embedded);
        assert_eq!(resolved.instant.day(), 4);
        assert_eq!(resolved.instant.hour(), 15);
    }

    #[test]
    fn filesystem_candidates_are_last_in_every_table() {
        let profiles = [
            SourceProfile::DjiMavic3Pro,
            SourceProfile::SonyA7Iv,
            SourceProfile::DjiRcProScreenRecording,
            SourceProfile::Unknown,
        ];
        for profile in profiles {
            for ext in ["arw", "dng", "jpg", "mp4"] {
                let table = precedence(profile, ext);
                let fs_positions: Vec<usize> = table
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.reliability() == Reliability::Filesystem)
                    .map(|(i, _)| i)
                    .collect();
                assert!(fs_positions.iter().all(|&i| i == table.len() - 1));
            }
        }
    }

    #[test]
    fn offset_companion_is_applied_then_expressed_in_target_zone() {
        let m = meta(&[
            (Tag::DateTimeOriginal, "2025:06:04 15:30:00"),
            (Tag::OffsetTimeOriginal, "+02:00"),
        ]);
        let resolved = utc()
            .resolve(&m, SourceProfile::SonyA7Iv, "jpg")
            .expect("resolves");
        assert_eq!(resolved.instant.hour(), 13);
        assert_eq!(resolved.instant.offset().local_minus_utc(), 0);
    }

    #[test]
    fn naive_values_are_local_time_in_configured_zone() {
        let tokyo = TimestampResolver::new("Asia/Tokyo".parse().expect("tz"));
        let m = meta(&[(Tag::DateTimeOriginal, "2025:06:04 15:30:00")]);
        let resolved = tokyo
            .resolve(&m, SourceProfile::DjiMavic3Pro, "jpg")
            .expect("resolves");
        assert_eq!(resolved.instant.hour(), 15);
        assert_eq!(resolved.instant.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn unparseable_candidates_are_skipped() {
        let m = meta(&[
            (Tag::SubSecDateTimeOriginal, "0000:00:00 00:00:00"),
            (Tag::CreateDate, "2025:06:04 15:30:00"),
        ]);
        let resolved = utc()
            .resolve(&m, SourceProfile::Unknown, "jpg")
            .expect("resolves");
        assert_eq!(resolved.source, TimestampSource::Tag(Tag::CreateDate));
    }

    #[test]
    fn missing_timestamps_fail_without_default() {
        let m = meta(&[(Tag::Make, "SONY")]);
        let err = utc()
            .resolve(&m, SourceProfile::SonyA7Iv, "arw")
            .expect_err("no timestamp");
        assert!(err.tried.contains(&TimestampSource::Tag(Tag::DateTimeOriginal)));
    }

    #[test]
    fn filesystem_fallback_can_be_disabled() {
        let m = meta(&[(Tag::FileModifyDate, "2025:06:04 15:30:00+00:00")]);
        let mut resolver = utc();
        let resolved = resolver
            .resolve(&m, SourceProfile::SonyA7Iv, "arw")
            .expect("falls back");
        assert_eq!(resolved.reliability, Reliability::Filesystem);

        resolver.filesystem_fallback = false;
        assert!(resolver.resolve(&m, SourceProfile::SonyA7Iv, "arw").is_err());
    }

    #[test]
    fn dst_gap_is_unparseable_and_overlap_takes_earlier() {
        let berlin = TimestampResolver::new("Europe/Berlin".parse().expect("tz"));
        let gap = meta(&[(Tag::DateTimeOriginal, "2025:03:30 02:30:00")]);
        assert!(berlin.resolve(&gap, SourceProfile::Unknown, "jpg").is_err());

        let overlap = meta(&[(Tag::DateTimeOriginal, "2025:10:26 02:30:00")]);
        let resolved = berlin
            .resolve(&overlap, SourceProfile::Unknown, "jpg")
            .expect("resolves");
        assert_eq!(resolved.instant.offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn unknown_zone_names_are_rejected() {
        assert!("Mars/Olympus".parse::<TimeZoneSetting>().is_err());
        assert_eq!("local".parse::<TimeZoneSetting>(), Ok(TimeZoneSetting::Local));
        assert_eq!(
            "UTC".parse::<TimeZoneSetting>().map(|tz| tz.to_string()),
            Ok("UTC".to_string())
        );
    }
}
