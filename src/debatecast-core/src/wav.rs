//! WAV helpers built on `hound`.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::StageError;

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, StageError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| StageError::Backend(format!("Failed to start WAV: {}", e)))?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| StageError::Backend(format!("Failed to write WAV: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| StageError::Backend(format!("Failed to finalize WAV: {}", e)))?;
    }

    Ok(cursor.into_inner())
}

/// Duration of a WAV payload in seconds.
///
/// Returns `None` when the bytes are not a RIFF/WAVE container (the audio
/// service may answer with another format), and an error when they claim to
/// be WAV but cannot be parsed.
pub fn wav_duration_secs(bytes: &[u8]) -> Result<Option<f64>, StageError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Ok(None);
    }

    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| StageError::Rejected(format!("corrupt WAV: {}", e)))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(StageError::Rejected("WAV has zero sample rate".to_string()));
    }

    Ok(Some(reader.duration() as f64 / spec.sample_rate as f64))
}
