//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::role::SpeakerRole;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub services: ServicesConfig,
    pub validation: ValidationConfig,
    pub assets: AssetsConfig,
    pub voices: VoicesConfig,
    pub output: OutputConfig,
    pub render: RenderConfig,
    pub prompts: PromptsConfig,
    pub fallback: FallbackConfig,
}

/// Endpoints and timeouts for the generative backends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// `"openai"` for any OpenAI-compatible chat endpoint, `"http"` for the plain text service.
    pub text_backend: String,
    pub text_url: String,
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    /// `"http"` or `"kokoro"` (local synthesis, needs the `kokoro` feature).
    pub audio_backend: String,
    pub audio_url: String,
    pub lipsync_url: String,
    pub verify_tls: bool,
    pub text_timeout_secs: u64,
    pub audio_timeout_secs: u64,
    pub video_timeout_secs: u64,
    pub text_retries: u32,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            text_backend: "openai".to_string(),
            text_url: "http://localhost:8001/generate".to_string(),
            model: "local-model".to_string(),
            api_base: "http://localhost:1234/v1".to_string(),
            api_key: String::new(),
            audio_backend: "http".to_string(),
            audio_url: "http://localhost:8002/synthesize".to_string(),
            lipsync_url: "http://localhost:8003".to_string(),
            verify_tls: true,
            text_timeout_secs: 300,
            audio_timeout_secs: 300,
            video_timeout_secs: 600,
            text_retries: 3,
        }
    }
}

impl ServicesConfig {
    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_secs)
    }

    /// Budget for the whole text stage: every attempt at `text_timeout` plus
    /// the backoff sleeps between them.
    pub fn text_stage_timeout(&self) -> Duration {
        let attempts = self.text_retries.max(1);
        let backoff: Duration = (1..attempts).map(crate::services::text::retry_delay).sum();
        self.text_timeout() * attempts + backoff
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_secs(self.audio_timeout_secs)
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }
}

/// Artifact acceptance thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub min_text_chars: usize,
    pub min_audio_bytes: usize,
    pub min_video_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 20,
            min_audio_bytes: 1000,
            min_video_bytes: 50_000,
        }
    }
}

/// Reference portraits fed to the lip-sync service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub pro_image: PathBuf,
    pub con_image: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            pro_image: PathBuf::from("assets/person1.jpg"),
            con_image: PathBuf::from("assets/person2.jpg"),
        }
    }
}

impl AssetsConfig {
    pub fn image_for(&self, role: SpeakerRole) -> &Path {
        match role {
            SpeakerRole::Pro => &self.pro_image,
            SpeakerRole::Con => &self.con_image,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    /// Speaker id sent to the audio service for the pro side.
    pub pro_speaker: String,
    pub con_speaker: String,
    /// Kokoro voice ids, only used by the local backend.
    pub pro_voice: String,
    pub con_voice: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            pro_speaker: "person1".to_string(),
            con_speaker: "person2".to_string(),
            pro_voice: "bm_george".to_string(),
            con_voice: "bf_emma".to_string(),
        }
    }
}

impl VoicesConfig {
    pub fn speaker_for(&self, role: SpeakerRole) -> &str {
        match role {
            SpeakerRole::Pro => &self.pro_speaker,
            SpeakerRole::Con => &self.con_speaker,
        }
    }

    pub fn voice_for(&self, role: SpeakerRole) -> &str {
        match role {
            SpeakerRole::Pro => &self.pro_voice,
            SpeakerRole::Con => &self.con_voice,
        }
    }
}

/// Where artifacts are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Parent directory for per-session scratch space.
    pub work_dir: PathBuf,
    pub max_rounds: u32,
    /// Turns rendered through audio/video at once; 1 keeps everything sequential.
    pub clip_concurrency: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            work_dir: std::env::temp_dir().join("debatecast"),
            max_rounds: 5,
            clip_concurrency: 1,
        }
    }
}

/// Speaker placement in the final video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Each clip scaled to fill the canvas.
    #[default]
    Fit,
    /// Speaker scaled down and placed left/right by turn parity.
    Alternating,
}

/// Encoding profile for the assembled video.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_sample_rate: u32,
    pub layout: Layout,
    pub speaker_width_fraction: f32,
    pub background: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 25,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: "2M".to_string(),
            audio_sample_rate: 44_100,
            layout: Layout::Fit,
            speaker_width_fraction: 0.45,
            background: "black".to_string(),
        }
    }
}

/// Prompts for the OpenAI-compatible text backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system: String,
    /// Supports `{topic}`, `{stance}` and `{context}`.
    pub user_template: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: "You are a skilled debater. Provide clear, concise arguments.".to_string(),
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
            max_tokens: 200,
            temperature: 0.7,
        }
    }
}

impl PromptsConfig {
    /// Fill the user template for one turn.
    pub fn render(&self, topic: &str, role: SpeakerRole, context: &str) -> String {
        let context_block = if context.trim().is_empty() {
            String::new()
        } else {
            format!("\nDebate so far:\n{}", context)
        };

        self.user_template
            .replace("{topic}", topic)
            .replace("{stance}", role.stance())
            .replace("{context}", &context_block)
    }
}

/// Static arguments used when text generation fails.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub pro: Vec<String>,
    pub con: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            pro: DEFAULT_PRO_FALLBACKS.iter().map(|s| s.to_string()).collect(),
            con: DEFAULT_CON_FALLBACKS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.fallback.pro.is_empty() || self.fallback.con.is_empty() {
            return Err(DebateError::ConfigError(
                "Fallback template pools must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.render.speaker_width_fraction)
            || self.render.speaker_width_fraction == 0.0
        {
            return Err(DebateError::ConfigError(format!(
                "speaker_width_fraction must be in (0, 1], got {}",
                self.render.speaker_width_fraction
            )));
        }
        if self.render.width == 0 || self.render.height == 0 || self.render.fps == 0 {
            return Err(DebateError::ConfigError(
                "Render width, height and fps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

const DEFAULT_USER_TEMPLATE: &str = r#"Debate Topic: {topic}

You are arguing {stance} this statement.
{context}
Provide a compelling 2-3 sentence argument. Be specific and persuasive. Keep under 150 words.

Your argument:"#;

const DEFAULT_PRO_FALLBACKS: [&str; 3] = [
    "The transformation where {topic} represents an inevitable technological evolution that will ultimately benefit society. Historical evidence from the Industrial Revolution shows that while automation initially displaces workers, it creates new industries and higher-skilled employment opportunities. Companies like Tesla and Amazon demonstrate how automation reduces costs while generating entirely new job categories in robotics, AI development, and human-machine collaboration.",
    "Economic data strongly supports that {topic} will drive unprecedented productivity gains. McKinsey research indicates that AI automation could contribute $13 trillion to global GDP by 2030 through increased efficiency and innovation. Countries embracing this transition, like Singapore and South Korea, are already seeing reduced workplace injuries, improved product quality, and new service sectors emerging around human creativity and emotional intelligence.",
    "The technological capabilities now exist to make {topic} a reality within this timeframe. Recent advances in machine learning, robotics, and natural language processing have reached human-level performance in manufacturing, customer service, and data analysis. Companies that resist this transition will become uncompetitive, while early adopters create safer, more fulfilling work environments focused on uniquely human skills.",
];

const DEFAULT_CON_FALLBACKS: [&str; 3] = [
    "The premise that {topic} fundamentally misunderstands the complexity of human work and the limitations of current AI systems. While automation excels at repetitive tasks, most jobs require emotional intelligence, creative problem-solving, and contextual judgment that remain beyond AI capabilities. The Oxford Economics study showing 20 million manufacturing jobs at risk fails to account for the 97 million new roles the World Economic Forum predicts AI will create.",
    "Historical precedent suggests that {topic} overestimates the speed of technological adoption and underestimates human adaptability. The transition from agriculture to manufacturing took over a century, allowing gradual workforce adjustment. Current retraining programs and educational initiatives are already preparing workers for AI collaboration rather than replacement, as seen in Germany's Industry 4.0 initiative.",
    "The assumption that {topic} ignores critical economic and social factors that will slow this transition. Regulatory frameworks, ethical concerns about algorithmic bias, and the high costs of AI implementation will create natural barriers. Additionally, consumer preferences often favor human interaction in healthcare, education, and hospitality sectors, ensuring sustained demand for human workers in these essential areas.",
];
