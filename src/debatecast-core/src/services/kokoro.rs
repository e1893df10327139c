//! Local speech synthesis using kokoro-tiny.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use tracing::info;

use super::AudioService;
use crate::config::VoicesConfig;
use crate::error::{DebateError, StageError};
use crate::role::SpeakerRole;
use crate::wav::encode_wav;

/// Kokoro output rate.
const SAMPLE_RATE: u32 = 24_000;
/// Pause between chunks (0.3 seconds) to prevent cutoff.
const CHUNK_PAUSE: usize = 7_200;
/// Trailing padding (0.5 seconds) so the lip-sync model sees the final syllable.
const TRAILING_PAD: usize = 12_000;
/// Kokoro has a ~200 char safe limit per call.
const MAX_CHUNK_CHARS: usize = 200;

/// Audio backend that synthesizes in-process instead of calling a service.
pub struct KokoroAudioService {
    engine: Arc<Mutex<TtsEngine>>,
    voices: VoicesConfig,
}

impl KokoroAudioService {
    /// Initialize the TTS engine (downloads model on first run) and check configured voices.
    pub async fn new(voices: VoicesConfig) -> Result<Self, DebateError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::ConfigError(format!("Failed to initialize TTS: {}", e)))?;

        let available = engine.voices();
        for role in SpeakerRole::ALL {
            let voice = voices.voice_for(role);
            if !available.iter().any(|v| v == voice) {
                return Err(DebateError::ConfigError(format!(
                    "Unknown voice '{}' for {} speaker",
                    voice, role
                )));
            }
        }
        info!("Kokoro TTS ready with {} voices", available.len());

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            voices,
        })
    }
}

#[async_trait]
impl AudioService for KokoroAudioService {
    async fn synthesize(&self, text: &str, role: SpeakerRole) -> Result<Vec<u8>, StageError> {
        let engine = Arc::clone(&self.engine);
        let voice = self.voices.voice_for(role).to_string();
        let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);

        let samples = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, StageError> {
            let mut engine = engine
                .lock()
                .map_err(|_| StageError::Backend("TTS engine lock poisoned".to_string()))?;

            let mut all_samples = Vec::new();
            for chunk in chunks {
                let samples = engine
                    .synthesize(&chunk, Some(voice.as_str()))
                    .map_err(|e| StageError::Backend(format!("Synthesis failed: {}", e)))?;
                all_samples.extend(samples);
                all_samples.extend(std::iter::repeat_n(0.0, CHUNK_PAUSE));
            }
            all_samples.extend(std::iter::repeat_n(0.0, TRAILING_PAD));
            Ok(all_samples)
        })
        .await
        .map_err(|e| StageError::Backend(format!("Synthesis task failed: {}", e)))??;

        encode_wav(&samples, SAMPLE_RATE)
    }
}

/// Split text into chunks that are safe for TTS synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars && !current_chunk.is_empty() {
            chunks.push(current_chunk.trim().to_string());
            current_chunk.clear();
        }

        if sentence.len() > max_chars {
            // Long sentence, fall back to comma boundaries
            for part in sentence.split_inclusive(',') {
                if current_chunk.len() + part.len() > max_chars && !current_chunk.is_empty() {
                    chunks.push(current_chunk.trim().to_string());
                    current_chunk.clear();
                }
                current_chunk.push_str(part);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_into_chunks() {
        let text = "Hello world. This is a test. Another sentence here.";
        let chunks = split_into_chunks(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.len() <= 35);
        }
    }

    #[test]
    fn test_split_keeps_all_words() {
        let text = "One, two, three, four. Five!";
        let joined = split_into_chunks(text, 10).join(" ");
        for word in ["One", "two", "three", "four", "Five"] {
            assert!(joined.contains(word));
        }
    }
}
