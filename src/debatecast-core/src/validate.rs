//! Acceptance checks applied to each stage's output before it is used.

use crate::config::ValidationConfig;
use crate::error::StageError;
use crate::wav::wav_duration_secs;

/// Responses that are technically non-empty but carry no argument.
const DEGENERATE_TEXT: [&str; 2] = ["...", "\u{2026}"];

/// Accept generated text, returning it trimmed.
pub fn validate_text(raw: &str, rules: &ValidationConfig) -> Result<String, StageError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(StageError::Rejected("empty text".to_string()));
    }
    if DEGENERATE_TEXT.contains(&text) {
        return Err(StageError::Rejected(format!("placeholder text '{}'", text)));
    }
    let chars = text.chars().count();
    if chars < rules.min_text_chars {
        return Err(StageError::Rejected(format!(
            "text too short: {} chars (minimum {})",
            chars, rules.min_text_chars
        )));
    }
    Ok(text.to_string())
}

/// Accept a synthesized waveform.
pub fn validate_audio(bytes: &[u8], rules: &ValidationConfig) -> Result<(), StageError> {
    if bytes.len() <= rules.min_audio_bytes {
        return Err(StageError::Rejected(format!(
            "audio too small: {} bytes (must exceed {})",
            bytes.len(),
            rules.min_audio_bytes
        )));
    }
    if let Some(duration) = wav_duration_secs(bytes)? {
        if duration <= 0.0 {
            return Err(StageError::Rejected("audio has no samples".to_string()));
        }
    }
    Ok(())
}

/// Accept a lip-synced clip by size.
pub fn validate_video(bytes: &[u8], rules: &ValidationConfig) -> Result<(), StageError> {
    if bytes.len() <= rules.min_video_bytes {
        return Err(StageError::Rejected(format!(
            "video too small: {} bytes (must exceed {})",
            bytes.len(),
            rules.min_video_bytes
        )));
    }
    Ok(())
}

/// Accept a probed clip duration; `None` means no probe was able to tell.
pub fn validate_duration(duration: Option<f64>) -> Result<(), StageError> {
    match duration {
        Some(secs) if secs <= 0.0 || !secs.is_finite() => Err(StageError::Rejected(format!(
            "video duration {} is not positive",
            secs
        ))),
        _ => Ok(()),
    }
}
