//! Lip-sync video generation over HTTP.
//!
//! The service takes a base64 portrait and waveform and answers with a
//! base64 MP4: `{"success": true, "video": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{VideoService, build_http_client, ensure_success};
use crate::error::{DebateError, StageError};

pub struct HttpVideoService {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct LipsyncRequest {
    image: String,
    audio: String,
}

#[derive(Debug, Deserialize)]
struct LipsyncResponse {
    success: bool,
    #[serde(default)]
    video: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpVideoService {
    /// `base_url` is the service root; trailing slashes are ignored.
    pub fn new(base_url: &str, verify_tls: bool, timeout: Duration) -> Result<Self, DebateError> {
        Ok(Self {
            client: build_http_client(timeout, verify_tls)?,
            endpoint: lipsync_endpoint(base_url),
        })
    }
}

fn lipsync_endpoint(base_url: &str) -> String {
    format!("{}/lipsync", base_url.trim_end_matches('/'))
}

fn decode_response(body: LipsyncResponse) -> Result<Vec<u8>, StageError> {
    if !body.success {
        return Err(StageError::Backend(
            body.error
                .unwrap_or_else(|| "lip-sync service reported failure".to_string()),
        ));
    }

    let encoded = body
        .video
        .ok_or_else(|| StageError::Malformed("success without video payload".to_string()))?;
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| StageError::Malformed(format!("video is not valid base64: {}", e)))
}

#[async_trait]
impl VideoService for HttpVideoService {
    async fn lipsync(&self, image: &[u8], audio: &[u8]) -> Result<Vec<u8>, StageError> {
        let request = LipsyncRequest {
            image: STANDARD.encode(image),
            audio: STANDARD.encode(audio),
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let body: LipsyncResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| StageError::Malformed(format!("lip-sync response: {}", e)))?;

        let video = decode_response(body)?;
        debug!("Received {} byte clip from lip-sync service", video.len());
        Ok(video)
    }
}
