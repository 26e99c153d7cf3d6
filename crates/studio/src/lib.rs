use credentials::ProviderKind;
use thiserror::Error;
use timeline::{SegmentId, TimelineError};

mod catalog;
pub use catalog::*;
mod render;
pub use render::*;
mod script;
pub use script::*;
mod session;
pub use session::*;
mod slides;
pub use slides::*;

/// Failures surfaced by the orchestration layer. Precondition violations are
/// distinguishable from transport errors so callers can react (for example
/// by re-opening the credential prompt) without making a network call.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("no project selected")]
    NoProject,
    #[error("prompt text is empty")]
    EmptyPrompt,
    #[error("segment not found: {0}")]
    SegmentNotFound(SegmentId),
    #[error("segment {0} has no visual prompt")]
    MissingVisualPrompt(SegmentId),
    #[error("image generation already in flight for segment {0}")]
    SlideInFlight(SegmentId),
    #[error("{0} API key is not configured")]
    NotConfigured(ProviderKind),
    #[error("timeline needs at least one segment with script text")]
    NothingWritten,
    #[error(transparent)]
    Timeline(#[from] TimelineError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StudioError {
    /// Whether this failure means "open the credential configuration prompt".
    pub fn needs_configuration(&self) -> bool {
        matches!(self, StudioError::NotConfigured(_))
    }
}
