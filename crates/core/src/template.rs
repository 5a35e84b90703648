use crate::fields::DescriptiveFields;
use crate::metadata::MediaKind;
use crate::profile::SourceProfile;
use crate::sanitize::{cleanup_filename, sanitize_component};
use crate::timestamp::ResolvedTimestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PHOTO_TEMPLATE: &str = "{date}-{time}-{label}-{focal_length}";
pub const DEFAULT_VIDEO_TEMPLATE: &str = "{date}-{time}-{resolution}-{fps}-{duration}-{label}";
pub const DEFAULT_SCREEN_RECORDING_TEMPLATE: &str = "{date}-{time}-{label}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Date,
    Time,
    Label,
    FocalLength,
    Resolution,
    Fps,
    Duration,
    Make,
    Model,
    ShutterCount,
    Sequence,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("テンプレートが空です")]
    Empty,
    #[error("中括弧の対応が不正です")]
    UnbalancedBraces,
    #[error("未対応トークンです: {0}")]
    UnknownToken(String),
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.trim().is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
                }
                let mut name = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    match next {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnbalancedBraces),
                        _ => name.push(next),
                    }
                }
                if !closed || name.is_empty() {
                    return Err(TemplateError::UnbalancedBraces);
                }
                parts.push(TemplatePart::Token(parse_token(name.trim())?));
            }
            '}' => return Err(TemplateError::UnbalancedBraces),
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal));
    }

    Ok(parts)
}

fn parse_token(name: &str) -> Result<Token, TemplateError> {
    match name {
        "date" => Ok(Token::Date),
        "time" => Ok(Token::Time),
        "label" => Ok(Token::Label),
        "focal_length" => Ok(Token::FocalLength),
        "resolution" => Ok(Token::Resolution),
        "fps" => Ok(Token::Fps),
        "duration" => Ok(Token::Duration),
        "make" => Ok(Token::Make),
        "model" => Ok(Token::Model),
        "shutter_count" => Ok(Token::ShutterCount),
        "sequence" => Ok(Token::Sequence),
        other => Err(TemplateError::UnknownToken(other.to_string())),
    }
}

/// Values a template is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct NamingContext<'a> {
    pub timestamp: &'a ResolvedTimestamp,
    pub profile: SourceProfile,
    pub fields: &'a DescriptiveFields,
}

impl NamingContext<'_> {
    fn value(&self, token: Token) -> Option<String> {
        let instant = &self.timestamp.instant;
        match token {
            Token::Date => Some(instant.format("%Y-%m-%d").to_string()),
            Token::Time => Some(instant.format("%H%M%S").to_string()),
            Token::Label => Some(self.profile.label(
                self.fields.make.as_deref(),
                self.fields.model.as_deref(),
            )),
            Token::FocalLength => self.fields.focal_length_text(),
            Token::Resolution => self.fields.resolution.clone(),
            Token::Fps => self.fields.fps_text(),
            Token::Duration => self.fields.duration_text(),
            Token::Make => self.fields.make.clone(),
            Token::Model => self.fields.model.clone(),
            Token::ShutterCount => self.fields.shutter_count_text(),
            Token::Sequence => self.fields.sequence.clone(),
        }
    }
}

/// Renders parsed parts. Missing values vanish together with their separators
/// and every piece is reduced to `[A-Za-z0-9-]`.
pub fn render_template(parts: &[TemplatePart], context: &NamingContext<'_>) -> String {
    let mut output = String::new();
    for part in parts {
        let piece = match part {
            TemplatePart::Literal(text) => sanitize_literal(text),
            TemplatePart::Token(token) => context
                .value(*token)
                .map(|v| sanitize_component(&v))
                .unwrap_or_default(),
        };
        output.push_str(&piece);
    }
    cleanup_filename(&output)
}

/// Literals keep their hyphens at the edges so they can still join tokens.
fn sanitize_literal(text: &str) -> String {
    text.chars()
        .filter_map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                Some(ch)
            } else if ch.is_whitespace() || matches!(ch, '_' | '.' | ':' | '/' | '\\') {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

/// Naming templates as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamingConfig {
    pub photo: String,
    pub video: String,
    pub screen_recording: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            photo: DEFAULT_PHOTO_TEMPLATE.to_string(),
            video: DEFAULT_VIDEO_TEMPLATE.to_string(),
            screen_recording: DEFAULT_SCREEN_RECORDING_TEMPLATE.to_string(),
        }
    }
}

/// Parsed templates, one per naming shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTemplates {
    photo: Vec<TemplatePart>,
    video: Vec<TemplatePart>,
    screen_recording: Vec<TemplatePart>,
}

impl NamingTemplates {
    pub fn parse(config: &NamingConfig) -> Result<Self, TemplateError> {
        Ok(Self {
            photo: parse_template(&config.photo)?,
            video: parse_template(&config.video)?,
            screen_recording: parse_template(&config.screen_recording)?,
        })
    }

    fn select(&self, profile: SourceProfile, kind: MediaKind) -> &[TemplatePart] {
        if profile.is_screen_recording() {
            &self.screen_recording
        } else if kind == MediaKind::Video {
            &self.video
        } else {
            &self.photo
        }
    }

    /// Base filename without extension. Deterministic for fixed inputs.
    pub fn build(
        &self,
        timestamp: &ResolvedTimestamp,
        profile: SourceProfile,
        kind: MediaKind,
        fields: &DescriptiveFields,
    ) -> String {
        let context = NamingContext {
            timestamp,
            profile,
            fields,
        };
        let rendered = render_template(self.select(profile, kind), &context);
        if rendered.is_empty() {
            // Templates made only of absent values still need a name.
            return timestamp.instant.format("%Y-%m-%d-%H%M%S").to_string();
        }
        rendered
    }
}

impl Default for NamingTemplates {
    fn default() -> Self {
        Self {
            photo: parse_default(DEFAULT_PHOTO_TEMPLATE),
            video: parse_default(DEFAULT_VIDEO_TEMPLATE),
            screen_recording: parse_default(DEFAULT_SCREEN_RECORDING_TEMPLATE),
        }
    }
}

fn parse_default(template: &str) -> Vec<TemplatePart> {
    parse_template(template).unwrap_or_default()
}
