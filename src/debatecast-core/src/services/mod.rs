//! Collaborator seams used by the debate generator.
//!
//! Each generative stage sits behind a trait so that backends can be swapped
//! (remote HTTP services, an OpenAI-compatible endpoint, local synthesis) and
//! so the pipeline can be driven by in-memory fakes in tests.

pub mod audio;
#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod lipsync;
pub mod text;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::assembler::FfmpegAssembler;
use crate::config::Config;
use crate::error::{AssemblyError, DebateError, StageError};
use crate::generator::Clip;
use crate::probe::FfprobeProbe;
use crate::role::SpeakerRole;

pub use audio::HttpAudioService;
pub use lipsync::HttpVideoService;
pub use text::{HttpTextService, OpenAiTextService};

/// Input for one text generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRequest {
    pub topic: String,
    pub position: SpeakerRole,
    /// Transcript of all earlier accepted turns.
    pub context: String,
}

/// Produces argument text for one turn.
#[async_trait]
pub trait TextService: Send + Sync {
    async fn generate(&self, request: &TextRequest) -> Result<String, StageError>;
}

/// Turns argument text into a speech waveform.
#[async_trait]
pub trait AudioService: Send + Sync {
    async fn synthesize(&self, text: &str, role: SpeakerRole) -> Result<Vec<u8>, StageError>;
}

/// Animates a reference portrait to match a waveform.
#[async_trait]
pub trait VideoService: Send + Sync {
    async fn lipsync(&self, image: &[u8], audio: &[u8]) -> Result<Vec<u8>, StageError>;
}

/// Reports media durations.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// `Ok(None)` when the duration cannot be determined (e.g. no probe tool installed).
    async fn duration_secs(&self, path: &Path) -> Result<Option<f64>, StageError>;
}

/// Concatenates clips, in the given order, into one video file at `output`.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    async fn assemble(&self, clips: &[Clip], output: &Path) -> Result<(), AssemblyError>;
}

/// The full set of collaborators a generator runs against.
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextService>,
    pub audio: Arc<dyn AudioService>,
    pub video: Arc<dyn VideoService>,
    pub assembler: Arc<dyn VideoAssembler>,
    pub probe: Option<Arc<dyn MediaProbe>>,
}

impl Services {
    /// Build the configured backends.
    pub async fn from_config(config: &Config) -> Result<Self, DebateError> {
        let services = &config.services;

        let text: Arc<dyn TextService> = match services.text_backend.as_str() {
            "openai" => Arc::new(OpenAiTextService::new(services, &config.prompts)?),
            "http" => Arc::new(HttpTextService::new(
                &services.text_url,
                services.text_timeout(),
            )?),
            other => {
                return Err(DebateError::ConfigError(format!(
                    "Unknown text backend '{}'. Available backends: openai, http",
                    other
                )));
            }
        };

        let audio: Arc<dyn AudioService> = match services.audio_backend.as_str() {
            "http" => Arc::new(HttpAudioService::new(
                &services.audio_url,
                config.voices.clone(),
                services.audio_timeout(),
            )?),
            #[cfg(feature = "kokoro")]
            "kokoro" => Arc::new(kokoro::KokoroAudioService::new(config.voices.clone()).await?),
            other => {
                return Err(DebateError::ConfigError(format!(
                    "Unknown audio backend '{}'. Available backends: {}",
                    other,
                    audio_backends().join(", ")
                )));
            }
        };

        let video = Arc::new(HttpVideoService::new(
            &services.lipsync_url,
            services.verify_tls,
            services.video_timeout(),
        )?);

        info!(
            "Backends: text={} audio={} lipsync={}",
            services.text_backend, services.audio_backend, services.lipsync_url
        );

        Ok(Self {
            text,
            audio,
            video,
            assembler: Arc::new(FfmpegAssembler::new(config.render.clone())),
            probe: Some(Arc::new(FfprobeProbe::default())),
        })
    }
}

/// Audio backends compiled into this build.
pub fn audio_backends() -> Vec<&'static str> {
    let mut backends = vec!["http"];
    if cfg!(feature = "kokoro") {
        backends.push("kokoro");
    }
    backends
}

/// Shared HTTP client with the long timeouts generative calls need.
pub(crate) fn build_http_client(
    timeout: Duration,
    verify_tls: bool,
) -> Result<reqwest::Client, DebateError> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(!verify_tls)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into a `StageError::Status` carrying the body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, StageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StageError::Status {
        status: status.as_u16(),
        body: truncate(&body, 200),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
