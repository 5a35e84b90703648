mod apply;
mod config;
mod error;
mod exif_reader;
mod exiftool;
mod fields;
mod layout;
mod metadata;
mod planner;
mod profile;
mod sanitize;
mod template;
mod timestamp;

pub use apply::{apply_plan, summarize, ApplyReport, ExecutedAction, RunSummary};
pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    MetadataBackend, UnknownSourcePolicy,
};
pub use error::{ErrorKind, FailedFile, ProcessError};
pub use exif_reader::ExifReader;
pub use exiftool::{exiftool_available, ExifToolReader, DEFAULT_EXIFTOOL};
pub use fields::DescriptiveFields;
pub use layout::{already_processed, find_processed, plan_directory};
pub use metadata::{MediaFile, MediaKind, MetadataReader, RawMetadata, Tag};
pub use planner::{
    generate_plan, ActionKind, Destination, OrganizePlan, PlanOptions, PlanStats, PlannedAction,
};
pub use profile::{classify, SourceProfile};
pub use template::{
    parse_template, validate_template, NamingConfig, NamingTemplates, TemplateError,
};
pub use timestamp::{
    Reliability, ResolvedTimestamp, TimeZoneSetting, TimestampResolver, TimestampSource,
};
