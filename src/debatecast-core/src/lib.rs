//! DebateCast Core Library
//!
//! Turns a topic into a multi-round debate video: argument text, speech and
//! lip-synced clips per turn, concatenated into one file.

pub mod assembler;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod generator;
pub mod planner;
pub mod probe;
pub mod role;
pub mod services;
pub mod session;
pub mod validate;
pub mod wav;

pub use assembler::FfmpegAssembler;
pub use config::{Config, default_config};
pub use context::TranscriptContext;
pub use error::{AssemblyError, DebateError, StageError};
pub use fallback::FallbackTemplates;
pub use generator::{
    Clip, DebateCallback, DebateEvent, DebateGenerator, DebateResult, GeneratorSettings,
    PipelineStage,
};
pub use planner::{Turn, plan};
pub use probe::FfprobeProbe;
pub use role::SpeakerRole;
pub use services::{
    AudioService, MediaProbe, Services, TextRequest, TextService, VideoAssembler, VideoService,
};
pub use session::Session;
