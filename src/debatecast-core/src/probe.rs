//! Media duration probing with `ffprobe`.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::StageError;
use crate::services::MediaProbe;

/// Reads container durations by shelling out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration_secs(&self, path: &Path) -> Result<Option<f64>, StageError> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not installed, skipping duration check", self.program);
                return Ok(None);
            }
            Err(e) => return Err(StageError::Io(e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Rejected(format!(
                "unreadable media: {}",
                stderr.trim()
            )));
        }

        Ok(parse_duration(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse ffprobe's bare duration output; `N/A` and blanks mean unknown.
fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.480000\n"), Some(12.48));
        assert_eq!(parse_duration("\n0.000000\n"), Some(0.0));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[tokio::test]
    async fn test_missing_binary_means_unknown() {
        let probe = FfprobeProbe::new("definitely-not-a-real-ffprobe-binary");
        let result = probe.duration_secs(Path::new("clip.mp4")).await.unwrap();
        assert!(result.is_none());
    }
}
