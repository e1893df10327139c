//! Error types for the debate video pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::role::SpeakerRole;

/// Failures surfaced to the caller of `generate_debate`.
#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Debate topic must not be empty")]
    EmptyTopic,

    #[error("Missing reference image for {role} speaker: {}", path.display())]
    MissingReferenceImage { role: SpeakerRole, path: PathBuf },

    #[error("No video clips generated: all {planned} planned turns were dropped")]
    NoClips { planned: usize },

    #[error("Final assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Session workspace error: {0}")]
    Session(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DebateError {
    /// Stable identifier for the failure class, safe to hand to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            DebateError::EmptyTopic => "empty_topic",
            DebateError::MissingReferenceImage { .. } => "missing_reference_image",
            DebateError::NoClips { .. } => "no_clips",
            DebateError::Assembly(AssemblyError::Empty) => "no_clips",
            DebateError::Assembly(AssemblyError::Load { .. }) => "load_failed",
            DebateError::Assembly(AssemblyError::Encode(_)) => "encode_failed",
            DebateError::Assembly(AssemblyError::ToolMissing(..)) => "assembler_unavailable",
            DebateError::Session(_) => "session_error",
            DebateError::ConfigError(_) => "config_error",
        }
    }

    /// True when the request itself was unusable, as opposed to a backend or encode failure.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, DebateError::EmptyTopic)
    }
}

/// A single stage call that did not yield a usable artifact.
///
/// These never escape the coordinator: text failures are replaced by a
/// fallback template, audio and video failures drop the turn.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Failures of the final concatenation step.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("no clips to assemble")]
    Empty,

    #[error("failed to load clip {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("failed to encode final video: {0}")]
    Encode(String),

    #[error("could not start '{0}': {1}")]
    ToolMissing(String, #[source] std::io::Error),
}
