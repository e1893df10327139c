//! Final video assembly with ffmpeg.
//!
//! Clips from the lip-sync service do not share a frame size, so every input
//! is normalised onto a fixed canvas before the `concat` filter joins them.
//! The output is always encoded with the configured codec profile.

use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{Layout, RenderConfig};
use crate::error::AssemblyError;
use crate::generator::Clip;
use crate::services::VideoAssembler;

/// Concatenates clips by driving an `ffmpeg` filter graph.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    program: String,
    probe_program: String,
    profile: RenderConfig,
}

/// Where a clip's sound comes from in the filter graph.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AudioTrack {
    Stream,
    /// No audio stream; pad with this many seconds of silence.
    Silence(f64),
}

impl FfmpegAssembler {
    pub fn new(profile: RenderConfig) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            probe_program: "ffprobe".to_string(),
            profile,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_probe_program(mut self, program: impl Into<String>) -> Self {
        self.probe_program = program.into();
        self
    }

    /// Full ffmpeg argument list for `clips` written to `output`.
    fn build_args(&self, clips: &[Clip], tracks: &[AudioTrack], output: &Path) -> Vec<String> {
        let p = &self.profile;
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        for clip in clips {
            args.push("-i".to_string());
            args.push(clip.path.to_string_lossy().into_owned());
        }

        args.extend([
            "-filter_complex".to_string(),
            filter_graph(clips, tracks, p),
            "-map".to_string(),
            "[outv]".to_string(),
            "-map".to_string(),
            "[outa]".to_string(),
            "-c:v".to_string(),
            p.video_codec.clone(),
            "-b:v".to_string(),
            p.video_bitrate.clone(),
            "-r".to_string(),
            p.fps.to_string(),
            "-c:a".to_string(),
            p.audio_codec.clone(),
            "-ar".to_string(),
            p.audio_sample_rate.to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.to_string_lossy().into_owned(),
        ]);

        args
    }
}

impl FfmpegAssembler {
    /// Check every clip is readable and find out which ones carry sound,
    /// before spending time on the encode.
    async fn load_clips(&self, clips: &[Clip]) -> Result<Vec<AudioTrack>, AssemblyError> {
        let mut tracks = Vec::with_capacity(clips.len());
        for clip in clips {
            let metadata = tokio::fs::metadata(&clip.path)
                .await
                .map_err(|e| AssemblyError::Load {
                    path: clip.path.clone(),
                    reason: e.to_string(),
                })?;
            if metadata.len() == 0 {
                return Err(AssemblyError::Load {
                    path: clip.path.clone(),
                    reason: "file is empty".to_string(),
                });
            }
            tracks.push(self.audio_track(clip).await?);
        }
        Ok(tracks)
    }

    async fn audio_track(&self, clip: &Clip) -> Result<AudioTrack, AssemblyError> {
        let result = Command::new(&self.probe_program)
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_type:format=duration",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(&clip.path)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not installed, assuming {} has audio", self.probe_program, clip.turn_id);
                return Ok(AudioTrack::Stream);
            }
            Err(e) => {
                return Err(AssemblyError::Load {
                    path: clip.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if !output.status.success() {
            return Err(AssemblyError::Load {
                path: clip.path.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let (has_audio, duration) = parse_streams(&String::from_utf8_lossy(&output.stdout));
        if has_audio {
            return Ok(AudioTrack::Stream);
        }
        match duration.or(clip.duration_secs).filter(|d| *d > 0.0) {
            Some(secs) => {
                warn!("{} has no audio stream, padding with {:.2}s of silence", clip.turn_id, secs);
                Ok(AudioTrack::Silence(secs))
            }
            None => Err(AssemblyError::Load {
                path: clip.path.clone(),
                reason: "no audio stream and unknown duration".to_string(),
            }),
        }
    }
}

/// Parse `codec_type=`/`duration=` lines into (has audio, container duration).
fn parse_streams(stdout: &str) -> (bool, Option<f64>) {
    let mut has_audio = false;
    let mut duration = None;
    for line in stdout.lines().map(str::trim) {
        if line == "codec_type=audio" {
            has_audio = true;
        } else if let Some(value) = line.strip_prefix("duration=") {
            duration = value.parse::<f64>().ok();
        }
    }
    (has_audio, duration)
}

/// Build the filter graph that places each clip on the canvas and concatenates them.
fn filter_graph(clips: &[Clip], tracks: &[AudioTrack], p: &RenderConfig) -> String {
    let (w, h) = (p.width, p.height);
    let mut graph = String::new();

    for (i, (clip, track)) in clips.iter().zip(tracks).enumerate() {
        match p.layout {
            Layout::Fit => {
                let _ = write!(
                    graph,
                    "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                     pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color={bg},setsar=1,fps={fps},format=yuv420p[v{i}];",
                    bg = p.background,
                    fps = p.fps,
                );
            }
            Layout::Alternating => {
                let speaker_w = even((w as f32 * p.speaker_width_fraction) as u32);
                let margin = w / 20;
                let x = if clip.sequence % 2 == 0 {
                    margin.to_string()
                } else {
                    format!("W-w-{}", margin)
                };
                let _ = write!(
                    graph,
                    "color=c={bg}:s={w}x{h}:r={fps}[bg{i}];\
                     [{i}:v]scale={speaker_w}:-2,setsar=1[s{i}];\
                     [bg{i}][s{i}]overlay=x={x}:y=(H-h)/2:shortest=1,format=yuv420p[v{i}];",
                    bg = p.background,
                    fps = p.fps,
                );
            }
        }
        match track {
            AudioTrack::Stream => {
                let _ = write!(
                    graph,
                    "[{i}:a]aresample={rate},aformat=channel_layouts=stereo[a{i}];",
                    rate = p.audio_sample_rate,
                );
            }
            AudioTrack::Silence(secs) => {
                let _ = write!(
                    graph,
                    "anullsrc=channel_layout=stereo:sample_rate={rate},atrim=duration={secs:.3}[a{i}];",
                    rate = p.audio_sample_rate,
                );
            }
        }
    }

    for i in 0..clips.len() {
        let _ = write!(graph, "[v{i}][a{i}]");
    }
    let _ = write!(graph, "concat=n={}:v=1:a=1[outv][outa]", clips.len());

    graph
}

fn even(value: u32) -> u32 {
    (value.max(2)) & !1
}

#[async_trait]
impl VideoAssembler for FfmpegAssembler {
    async fn assemble(&self, clips: &[Clip], output: &Path) -> Result<(), AssemblyError> {
        if clips.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let tracks = self.load_clips(clips).await?;

        let args = self.build_args(clips, &tracks, output);
        debug!("Running {} {}", self.program, args.join(" "));
        info!(
            "Encoding {} clips to {} ({}x{} @ {}fps)",
            clips.len(),
            output.display(),
            self.profile.width,
            self.profile.height,
            self.profile.fps
        );

        // kill_on_drop reaps the encoder if the request is abandoned mid-encode
        let result = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await;

        let output_status = match result {
            Ok(out) => out,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AssemblyError::ToolMissing(self.program.clone(), e));
            }
            Err(e) => return Err(AssemblyError::Encode(e.to_string())),
        };

        if !output_status.status.success() {
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            return Err(AssemblyError::Encode(format!(
                "{} exited with {}: {}",
                self.program,
                output_status.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}
