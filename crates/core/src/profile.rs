use crate::metadata::{RawMetadata, Tag};
use crate::sanitize::sanitize_component;
use serde::{Deserialize, Serialize};

/// Known capture sources. Matching rules and naming data are static per variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SourceProfile {
    DjiMavic3Pro,
    SonyA7Iv,
    DjiRcProScreenRecording,
    Unknown,
}

/// Classification order. The screen recorder is checked before the drone
/// because both report DJI as make.
pub const PROFILE_PRIORITY: &[SourceProfile] = &[
    SourceProfile::DjiRcProScreenRecording,
    SourceProfile::DjiMavic3Pro,
    SourceProfile::SonyA7Iv,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Equals(Tag, &'static str),
    Contains(Tag, &'static str),
    ContainsAny(Tag, &'static [&'static str]),
    StartsWith(Tag, &'static str),
    Extension(&'static str),
    /// Tag absent from the metadata.
    Missing(Tag),
}

/// All conditions must hold.
#[derive(Debug, Clone, Copy)]
pub struct MatchRule(pub &'static [Condition]);

const MAVIC_MAKES: &[&str] = &["DJI", "Hasselblad"];
const MAVIC_MODELS: &[&str] = &["L2D-20c", "FC4382", "FC4370", "Mavic 3 Pro", "Mavic3Pro"];
const MAVIC_PRODUCT: &[&str] = &["Mavic3Pro", "Mavic 3 Pro"];

const RC_PRO_RULES: &[MatchRule] = &[
    MatchRule(&[Condition::StartsWith(Tag::FileName, "screen-")]),
    MatchRule(&[Condition::ContainsAny(Tag::Model, &["RC Pro", "RCPro"])]),
    MatchRule(&[Condition::Contains(Tag::FileName, "DJI-RCPro")]),
];

const MAVIC_RULES: &[MatchRule] = &[
    MatchRule(&[
        Condition::ContainsAny(Tag::Make, MAVIC_MAKES),
        Condition::ContainsAny(Tag::Model, MAVIC_MODELS),
    ]),
    MatchRule(&[Condition::ContainsAny(Tag::ProductName, MAVIC_PRODUCT)]),
    MatchRule(&[Condition::ContainsAny(Tag::Encoder, MAVIC_PRODUCT)]),
    MatchRule(&[
        Condition::StartsWith(Tag::FileName, "DJI_"),
        Condition::Missing(Tag::Model),
    ]),
    MatchRule(&[
        Condition::Contains(Tag::FileName, "DJI-Mavic3Pro"),
        Condition::Missing(Tag::Model),
    ]),
];

const SONY_RULES: &[MatchRule] = &[
    MatchRule(&[
        Condition::Equals(Tag::Make, "SONY"),
        Condition::Contains(Tag::Model, "ILCE-7M4"),
    ]),
    MatchRule(&[
        Condition::Equals(Tag::DeviceManufacturer, "Sony"),
        Condition::Contains(Tag::DeviceModelName, "ILCE-7M4"),
    ]),
    MatchRule(&[
        Condition::Contains(Tag::FileName, "Sony-ILCE7M4"),
        Condition::Missing(Tag::Model),
    ]),
    MatchRule(&[Condition::Extension("arw"), Condition::Missing(Tag::Model)]),
];

impl SourceProfile {
    pub fn rules(self) -> &'static [MatchRule] {
        match self {
            SourceProfile::DjiMavic3Pro => MAVIC_RULES,
            SourceProfile::SonyA7Iv => SONY_RULES,
            SourceProfile::DjiRcProScreenRecording => RC_PRO_RULES,
            SourceProfile::Unknown => &[],
        }
    }

    /// Fixed label for known sources; `None` for `Unknown`.
    pub fn fixed_label(self) -> Option<&'static str> {
        match self {
            SourceProfile::DjiMavic3Pro => Some("DJI-Mavic3Pro"),
            SourceProfile::SonyA7Iv => Some("Sony-ILCE7M4"),
            SourceProfile::DjiRcProScreenRecording => Some("DJI-RCPro"),
            SourceProfile::Unknown => None,
        }
    }

    /// Label used in filenames. Unknown sources fall back to make and model.
    pub fn label(self, make: Option<&str>, model: Option<&str>) -> String {
        match self.fixed_label() {
            Some(label) => label.to_string(),
            None => unknown_label(make, model),
        }
    }

    pub fn is_screen_recording(self) -> bool {
        self == SourceProfile::DjiRcProScreenRecording
    }

    fn matches(self, metadata: &RawMetadata, extension: &str) -> bool {
        self.rules()
            .iter()
            .any(|rule| rule.0.iter().all(|c| c.holds(metadata, extension)))
    }
}

impl Condition {
    fn holds(&self, metadata: &RawMetadata, extension: &str) -> bool {
        match *self {
            Condition::Equals(tag, expected) => metadata
                .get(tag)
                .map(|v| v.trim().eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            Condition::Contains(tag, needle) => metadata
                .get(tag)
                .map(|v| contains_ignore_case(v, needle))
                .unwrap_or(false),
            Condition::ContainsAny(tag, needles) => metadata
                .get(tag)
                .map(|v| needles.iter().any(|n| contains_ignore_case(v, n)))
                .unwrap_or(false),
            Condition::StartsWith(tag, prefix) => metadata
                .get(tag)
                .map(|v| {
                    v.len() >= prefix.len()
                        && v.is_char_boundary(prefix.len())
                        && v[..prefix.len()].eq_ignore_ascii_case(prefix)
                })
                .unwrap_or(false),
            Condition::Extension(ext) => extension.eq_ignore_ascii_case(ext),
            Condition::Missing(tag) => !metadata.contains(tag),
        }
    }
}

/// First matching profile in [`PROFILE_PRIORITY`], else `Unknown`.
pub fn classify(metadata: &RawMetadata, extension: &str) -> SourceProfile {
    PROFILE_PRIORITY
        .iter()
        .copied()
        .find(|profile| profile.matches(metadata, extension))
        .unwrap_or(SourceProfile::Unknown)
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

fn unknown_label(make: Option<&str>, model: Option<&str>) -> String {
    let make = make.map(sanitize_component).filter(|v| !v.is_empty());
    let model = model.map(sanitize_component).filter(|v| !v.is_empty());

    match (make, model) {
        (Some(make), Some(model)) => {
            if model
                .to_ascii_lowercase()
                .starts_with(&make.to_ascii_lowercase())
            {
                model
            } else {
                format!("{make}-{model}")
            }
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => "Unknown".to_string(),
    }
}
