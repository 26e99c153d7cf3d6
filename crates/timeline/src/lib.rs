use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

mod store;
pub use store::*;
mod template;
pub use template::*;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("timeline must retain at least one segment")]
    LastSegment,
    #[error("segment not found: {0}")]
    SegmentNotFound(SegmentId),
    #[error("template '{0}' has no segment structure")]
    EmptyTemplate(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SegmentId(pub Uuid);

impl SegmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SegmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Narrative roles a segment can take. The vocabulary is open: these are the
/// values offered in pickers, but any string is accepted on the wire.
pub const SEGMENT_TYPES: [&str; 8] = [
    "Hook",
    "Intro",
    "Point",
    "Conclusion",
    "Curiosity Builder",
    "Problem",
    "Pain Points",
    "Holy Grail Solution",
];

pub const DEFAULT_BACKGROUND: &str = "#1e293b";

/// Beat durations are constrained to this range by the render service.
pub const MIN_DURATION_SECS: u32 = 2;
pub const MAX_DURATION_SECS: u32 = 4;
pub const FALLBACK_DURATION_SECS: u32 = 3;

/// Clamps a duration edit into the accepted range. Non-finite input falls
/// back to 3 seconds, out-of-range numbers snap to the nearest bound.
pub fn clamp_duration(secs: f64) -> u32 {
    if !secs.is_finite() {
        return FALLBACK_DURATION_SECS;
    }
    let rounded = secs.round();
    if rounded < MIN_DURATION_SECS as f64 {
        MIN_DURATION_SECS
    } else if rounded > MAX_DURATION_SECS as f64 {
        MAX_DURATION_SECS
    } else {
        rounded as u32
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Color,
    Image,
    Video,
}

/// One slide/beat of a video timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "visualPrompt")]
    pub visual_prompt: String,
    pub duration: u32,
    #[serde(rename = "mediaType")]
    pub media_type: MediaType,
    pub background: String,
    #[serde(default)]
    pub captions: bool,
    #[serde(
        rename = "maxWordsPerSegment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_words_per_segment: Option<u32>,
    #[serde(rename = "aspectRatio", default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl Segment {
    /// Creates an empty segment of the given narrative role. The duration
    /// default is the clamp fallback so freshly created beats are already
    /// inside the accepted range.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: SegmentId::new(),
            kind: kind.into(),
            text: String::new(),
            visual_prompt: String::new(),
            duration: FALLBACK_DURATION_SECS,
            media_type: MediaType::Color,
            background: DEFAULT_BACKGROUND.to_string(),
            captions: false,
            max_words_per_segment: None,
            aspect_ratio: None,
        }
    }
}

/// Field-by-field edit applied through [`Timeline::update`]. Absent fields
/// are left untouched.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SegmentPatch {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "visualPrompt")]
    pub visual_prompt: Option<String>,
    pub duration: Option<f64>,
    #[serde(rename = "mediaType")]
    pub media_type: Option<MediaType>,
    pub background: Option<String>,
    pub captions: Option<bool>,
}
