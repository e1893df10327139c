//! Speech synthesis over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{AudioService, build_http_client, ensure_success};
use crate::config::VoicesConfig;
use crate::error::{DebateError, StageError};
use crate::role::SpeakerRole;

/// Client for a `/synthesize` endpoint returning WAV bytes.
pub struct HttpAudioService {
    client: reqwest::Client,
    endpoint: String,
    voices: VoicesConfig,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    speaker: &'a str,
}

impl HttpAudioService {
    pub fn new(endpoint: &str, voices: VoicesConfig, timeout: Duration) -> Result<Self, DebateError> {
        Ok(Self {
            client: build_http_client(timeout, true)?,
            endpoint: endpoint.to_string(),
            voices,
        })
    }
}

#[async_trait]
impl AudioService for HttpAudioService {
    async fn synthesize(&self, text: &str, role: SpeakerRole) -> Result<Vec<u8>, StageError> {
        let speaker = self.voices.speaker_for(role);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SynthesizeRequest { text, speaker })
            .send()
            .await?;
        let bytes = ensure_success(response).await?.bytes().await?;
        debug!("Synthesized {} bytes for speaker {}", bytes.len(), speaker);
        Ok(bytes.to_vec())
    }
}
