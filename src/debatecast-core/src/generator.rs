//! Debate video generation.
//!
//! Drives every planned turn through text, speech and lip-sync, keeps the
//! clips that survive validation, and concatenates them into one video.
//!
//! Text is generated strictly in turn order because each call sees the
//! transcript of all earlier turns. Audio and video only depend on their own
//! turn's text, so that phase may run several turns at once; clips are put
//! back into turn order before assembly.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ValidationConfig};
use crate::context::TranscriptContext;
use crate::error::{DebateError, StageError};
use crate::fallback::FallbackTemplates;
use crate::planner::{Turn, plan};
use crate::role::SpeakerRole;
use crate::services::{Services, TextRequest};
use crate::session::Session;
use crate::validate::{validate_audio, validate_duration, validate_text, validate_video};

/// Stage of the per-turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Text,
    Audio,
    Video,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStage::Text => "text",
            PipelineStage::Audio => "audio",
            PipelineStage::Video => "video",
        })
    }
}

/// A turn whose video passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    pub turn_id: String,
    pub role: SpeakerRole,
    /// Position of the originating turn in the speaking order.
    pub sequence: usize,
    pub path: PathBuf,
    /// Probed duration, when a probe was available.
    pub duration_secs: Option<f64>,
}

/// Outcome of a successful debate.
#[derive(Debug, Clone, Serialize)]
pub struct DebateResult {
    pub video_path: PathBuf,
    pub session_id: String,
    /// Turn ids that made it into the video, in order.
    pub clip_ids: Vec<String>,
    pub planned_turns: usize,
}

/// Text accepted for a turn, before audio/video.
#[derive(Debug, Clone)]
struct ScriptedTurn {
    turn: Turn,
    text: String,
}

/// Why a turn produced no clip.
#[derive(Debug)]
struct TurnFailure {
    stage: PipelineStage,
    error: StageError,
}

impl TurnFailure {
    fn at(stage: PipelineStage) -> impl FnOnce(StageError) -> TurnFailure {
        move |error| TurnFailure { stage, error }
    }
}

/// Callback for debate events.
pub type DebateCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Events emitted during generation.
#[derive(Debug, Clone)]
pub enum DebateEvent {
    /// A session was opened and the turns planned.
    DebateStart {
        session_id: String,
        topic: String,
        turns: usize,
    },
    /// Text generation for a turn is starting.
    TurnStart { turn_id: String, role: SpeakerRole },
    /// Text for a turn was accepted.
    TextReady {
        turn_id: String,
        role: SpeakerRole,
        content: String,
        fallback: bool,
    },
    /// A turn produced a validated clip.
    ClipReady { turn_id: String, path: PathBuf },
    /// A turn was dropped.
    TurnDropped {
        turn_id: String,
        stage: PipelineStage,
        reason: String,
    },
    /// Surviving clips are being concatenated.
    Assembling { clips: usize },
    /// The final video is written.
    DebateEnd { video_path: PathBuf },
}

/// Knobs the generator needs from the configuration.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub validation: ValidationConfig,
    /// Covers all retries of one text call, not a single attempt.
    pub text_timeout: Duration,
    pub audio_timeout: Duration,
    pub video_timeout: Duration,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub clip_concurrency: usize,
    pub reference_images: HashMap<SpeakerRole, PathBuf>,
}

impl GeneratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let reference_images = SpeakerRole::ALL
            .iter()
            .map(|&role| (role, config.assets.image_for(role).to_path_buf()))
            .collect();

        Self {
            validation: config.validation.clone(),
            text_timeout: config.services.text_stage_timeout(),
            audio_timeout: config.services.audio_timeout(),
            video_timeout: config.services.video_timeout(),
            output_dir: config.output.dir.clone(),
            work_dir: config.output.work_dir.clone(),
            clip_concurrency: config.output.clip_concurrency.max(1),
            reference_images,
        }
    }
}

/// Generates debate videos from a topic.
pub struct DebateGenerator {
    services: Services,
    fallback: FallbackTemplates,
    settings: GeneratorSettings,
    callback: Option<DebateCallback>,
}

impl DebateGenerator {
    pub fn new(services: Services, fallback: FallbackTemplates, settings: GeneratorSettings) -> Self {
        Self {
            services,
            fallback,
            settings,
            callback: None,
        }
    }

    /// Build a generator with the backends named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self, DebateError> {
        let services = Services::from_config(config).await?;
        let fallback = FallbackTemplates::from_config(&config.fallback)?;
        Ok(Self::new(services, fallback, GeneratorSettings::from_config(config)))
    }

    /// Set a callback for debate events.
    pub fn with_callback(mut self, callback: DebateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Generate a debate of `rounds` rounds on `topic`.
    ///
    /// Turns that fail at audio or video are left out; the call only fails
    /// when no turn survives, when the topic is empty, when a reference image
    /// is missing, or when the final encode fails.
    pub async fn generate_debate(
        &self,
        topic: &str,
        rounds: u32,
    ) -> Result<DebateResult, DebateError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DebateError::EmptyTopic);
        }

        let images = self.load_reference_images().await?;
        let session = Session::create(&self.settings.work_dir).map_err(DebateError::Session)?;
        let session_id = session.id().to_string();
        let turns = plan(rounds);

        info!(
            "Starting debate '{}' ({} rounds, {} turns, session {})",
            topic,
            rounds,
            turns.len(),
            session_id
        );
        self.emit_event(DebateEvent::DebateStart {
            session_id: session_id.clone(),
            topic: topic.to_string(),
            turns: turns.len(),
        });

        let scripted = self.script_turns(topic, &turns).await;
        let clips = self.render_clips(&session, &images, scripted).await;

        if clips.is_empty() {
            error!("Session {}: no clips survived", session_id);
            return Err(DebateError::NoClips {
                planned: turns.len(),
            });
        }

        let video_path = self.assemble(&clips, &session_id).await?;

        if let Err(e) = session.close() {
            warn!("Failed to remove session workspace {}: {}", session_id, e);
        }

        info!(
            "Debate complete: {} of {} turns in {}",
            clips.len(),
            turns.len(),
            video_path.display()
        );
        self.emit_event(DebateEvent::DebateEnd {
            video_path: video_path.clone(),
        });

        Ok(DebateResult {
            video_path,
            session_id,
            clip_ids: clips.into_iter().map(|c| c.turn_id).collect(),
            planned_turns: turns.len(),
        })
    }

    /// Read both portraits up front so a missing asset fails before any generation.
    async fn load_reference_images(&self) -> Result<HashMap<SpeakerRole, Vec<u8>>, DebateError> {
        let mut images = HashMap::new();
        for role in SpeakerRole::ALL {
            let path = self
                .settings
                .reference_images
                .get(&role)
                .cloned()
                .unwrap_or_default();
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                error!("Reference image for {} at {}: {}", role, path.display(), e);
                DebateError::MissingReferenceImage {
                    role,
                    path: path.clone(),
                }
            })?;
            images.insert(role, bytes);
        }
        Ok(images)
    }

    /// Generate text for every turn in order, threading the transcript through.
    async fn script_turns(&self, topic: &str, turns: &[Turn]) -> Vec<ScriptedTurn> {
        let mut context = TranscriptContext::new();
        let mut scripted = Vec::with_capacity(turns.len());

        for turn in turns {
            if turn.role == SpeakerRole::Pro {
                info!("Round {}", turn.round_index + 1);
            }
            self.emit_event(DebateEvent::TurnStart {
                turn_id: turn.turn_id.clone(),
                role: turn.role,
            });

            let request = TextRequest {
                topic: topic.to_string(),
                position: turn.role,
                context: context.render(),
            };

            let (text, fallback) = match self.generate_text(&request).await {
                Ok(text) => (text, false),
                Err(e) => {
                    let rotation = context.count(turn.role);
                    warn!(
                        "Text generation failed for {} ({}), using fallback template {}",
                        turn.turn_id, e, rotation
                    );
                    (self.fallback.select(turn.role, topic, rotation), true)
                }
            };

            context = context.with_entry(turn.role, text.clone());
            self.emit_event(DebateEvent::TextReady {
                turn_id: turn.turn_id.clone(),
                role: turn.role,
                content: text.clone(),
                fallback,
            });
            scripted.push(ScriptedTurn {
                turn: turn.clone(),
                text,
            });
        }

        scripted
    }

    async fn generate_text(&self, request: &TextRequest) -> Result<String, StageError> {
        let raw = with_timeout(
            self.settings.text_timeout,
            self.services.text.generate(request),
        )
        .await?;
        validate_text(&raw, &self.settings.validation)
    }

    /// Run audio and video for every scripted turn, returning surviving clips in turn order.
    async fn render_clips(
        &self,
        session: &Session,
        images: &HashMap<SpeakerRole, Vec<u8>>,
        scripted: Vec<ScriptedTurn>,
    ) -> Vec<Clip> {
        let pending: Vec<_> = scripted
            .into_iter()
            .map(|turn| self.render_turn(session, images, turn))
            .collect();

        // Completion order is arbitrary once more than one turn is in flight
        let finished: Vec<Option<Clip>> = stream::iter(pending)
            .buffer_unordered(self.settings.clip_concurrency.max(1))
            .collect()
            .await;

        let mut clips: Vec<Clip> = finished.into_iter().flatten().collect();
        clips.sort_by_key(|clip| clip.sequence);
        clips
    }

    async fn render_turn(
        &self,
        session: &Session,
        images: &HashMap<SpeakerRole, Vec<u8>>,
        scripted: ScriptedTurn,
    ) -> Option<Clip> {
        let turn_id = scripted.turn.turn_id.clone();
        match self.clip_stages(session, images, &scripted).await {
            Ok(clip) => {
                debug!("Clip ready for {}: {}", turn_id, clip.path.display());
                self.emit_event(DebateEvent::ClipReady {
                    turn_id,
                    path: clip.path.clone(),
                });
                Some(clip)
            }
            Err(failure) => {
                error!(
                    "{} generation failed for {} clip {}, skipping clip: {}",
                    failure.stage, scripted.turn.role, turn_id, failure.error
                );
                self.emit_event(DebateEvent::TurnDropped {
                    turn_id,
                    stage: failure.stage,
                    reason: failure.error.to_string(),
                });
                None
            }
        }
    }

    async fn clip_stages(
        &self,
        session: &Session,
        images: &HashMap<SpeakerRole, Vec<u8>>,
        scripted: &ScriptedTurn,
    ) -> Result<Clip, TurnFailure> {
        let turn = &scripted.turn;
        let rules = &self.settings.validation;

        let audio = with_timeout(
            self.settings.audio_timeout,
            self.services.audio.synthesize(&scripted.text, turn.role),
        )
        .await
        .map_err(TurnFailure::at(PipelineStage::Audio))?;
        validate_audio(&audio, rules).map_err(TurnFailure::at(PipelineStage::Audio))?;
        session
            .write_artifact(&turn.turn_id, "wav", &audio)
            .await
            .map_err(|e| TurnFailure::at(PipelineStage::Audio)(e.into()))?;

        // Presence is checked before any turn runs
        let image = images.get(&turn.role).map(Vec::as_slice).unwrap_or_default();

        let video = with_timeout(
            self.settings.video_timeout,
            self.services.video.lipsync(image, &audio),
        )
        .await
        .map_err(TurnFailure::at(PipelineStage::Video))?;
        validate_video(&video, rules).map_err(TurnFailure::at(PipelineStage::Video))?;
        let path = session
            .write_artifact(&turn.turn_id, "mp4", &video)
            .await
            .map_err(|e| TurnFailure::at(PipelineStage::Video)(e.into()))?;

        let duration_secs = match &self.services.probe {
            Some(probe) => probe
                .duration_secs(&path)
                .await
                .map_err(TurnFailure::at(PipelineStage::Video))?,
            None => None,
        };
        validate_duration(duration_secs).map_err(TurnFailure::at(PipelineStage::Video))?;

        Ok(Clip {
            turn_id: turn.turn_id.clone(),
            role: turn.role,
            sequence: turn.sequence,
            path,
            duration_secs,
        })
    }

    async fn assemble(&self, clips: &[Clip], session_id: &str) -> Result<PathBuf, DebateError> {
        self.emit_event(DebateEvent::Assembling { clips: clips.len() });

        tokio::fs::create_dir_all(&self.settings.output_dir)
            .await
            .map_err(DebateError::Session)?;
        let output = output_path(&self.settings.output_dir, session_id);

        if let Err(e) = self.services.assembler.assemble(clips, &output).await {
            error!("Final assembly failed for session {}: {}", session_id, e);
            // A half-written container is worse than none
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e.into());
        }

        Ok(output)
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: DebateEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

/// Location of the final video for a session.
pub fn output_path(output_dir: &Path, session_id: &str) -> PathBuf {
    output_dir.join(format!("{}_debate.mp4", session_id))
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StageError>
where
    F: Future<Output = Result<T, StageError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StageError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblyError;
    use crate::services::{
        AudioService, MediaProbe, TextService, VideoAssembler, VideoService,
    };
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const AUDIO: &[u8] = &[7u8; 2_000];
    const VIDEO: &[u8] = &[9u8; 60_000];

    /// Records every request; fails for the listed call indices.
    #[derive(Default)]
    struct ScriptedText {
        requests: Mutex<Vec<TextRequest>>,
        failing_calls: HashSet<usize>,
    }

    impl ScriptedText {
        fn failing(calls: &[usize]) -> Self {
            Self {
                failing_calls: calls.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn contexts(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.context.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TextService for ScriptedText {
        async fn generate(&self, request: &TextRequest) -> Result<String, StageError> {
            let mut requests = self.requests.lock().unwrap();
            let index = requests.len();
            requests.push(request.clone());
            if self.failing_calls.contains(&index) {
                return Err(StageError::Backend("model offline".into()));
            }
            Ok(format!("Generated argument number {} for {}", index, request.position))
        }
    }

    /// Fails for the texts produced by the listed turn ids.
    #[derive(Default)]
    struct FakeAudio {
        fail_for_text: Mutex<Vec<String>>,
        undersized: bool,
    }

    #[async_trait]
    impl AudioService for FakeAudio {
        async fn synthesize(&self, text: &str, _role: SpeakerRole) -> Result<Vec<u8>, StageError> {
            if self.fail_for_text.lock().unwrap().iter().any(|t| text.contains(t.as_str())) {
                return Err(StageError::Status {
                    status: 500,
                    body: "tts crashed".into(),
                });
            }
            if self.undersized {
                return Ok(vec![0u8; 10]);
            }
            Ok(AUDIO.to_vec())
        }
    }

    /// Fails on the listed call indices.
    #[derive(Default)]
    struct FakeVideo {
        calls: Mutex<usize>,
        failing_calls: HashSet<usize>,
    }

    #[async_trait]
    impl VideoService for FakeVideo {
        async fn lipsync(&self, image: &[u8], audio: &[u8]) -> Result<Vec<u8>, StageError> {
            assert!(!image.is_empty());
            assert_eq!(audio, AUDIO);
            let mut calls = self.calls.lock().unwrap();
            let index = *calls;
            *calls += 1;
            if self.failing_calls.contains(&index) {
                return Ok(vec![0u8; 100]);
            }
            Ok(VIDEO.to_vec())
        }
    }

    /// Captures the clip order and whether the session files existed.
    #[derive(Default)]
    struct RecordingAssembler {
        received: Mutex<Vec<String>>,
        session_dirs: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    #[async_trait]
    impl VideoAssembler for RecordingAssembler {
        async fn assemble(&self, clips: &[Clip], output: &Path) -> Result<(), AssemblyError> {
            for clip in clips {
                assert!(clip.path.exists(), "clip file should exist during assembly");
                self.session_dirs
                    .lock()
                    .unwrap()
                    .push(clip.path.parent().unwrap().to_path_buf());
            }
            *self.received.lock().unwrap() = clips.iter().map(|c| c.turn_id.clone()).collect();
            if self.fail {
                std::fs::write(output, b"partial").unwrap();
                return Err(AssemblyError::Encode("x264 exploded".into()));
            }
            std::fs::write(output, b"final video").unwrap();
            Ok(())
        }
    }

    struct FixedProbe(Option<f64>);

    #[async_trait]
    impl MediaProbe for FixedProbe {
        async fn duration_secs(&self, _path: &Path) -> Result<Option<f64>, StageError> {
            Ok(self.0)
        }
    }

    struct Harness {
        _root: TempDir,
        settings: GeneratorSettings,
        text: Arc<ScriptedText>,
        audio: Arc<FakeAudio>,
        video: Arc<FakeVideo>,
        assembler: Arc<RecordingAssembler>,
        probe: Option<Arc<dyn MediaProbe>>,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let mut reference_images = HashMap::new();
            for role in SpeakerRole::ALL {
                let path = root.path().join(format!("{}.jpg", role));
                std::fs::write(&path, b"jpeg bytes").unwrap();
                reference_images.insert(role, path);
            }
            let settings = GeneratorSettings {
                validation: ValidationConfig::default(),
                text_timeout: Duration::from_secs(5),
                audio_timeout: Duration::from_secs(5),
                video_timeout: Duration::from_secs(5),
                output_dir: root.path().join("output"),
                work_dir: root.path().join("work"),
                clip_concurrency: 1,
                reference_images,
            };
            Self {
                _root: root,
                settings,
                text: Arc::new(ScriptedText::default()),
                audio: Arc::new(FakeAudio::default()),
                video: Arc::new(FakeVideo::default()),
                assembler: Arc::new(RecordingAssembler::default()),
                probe: None,
            }
        }

        fn generator(&self) -> DebateGenerator {
            let services = Services {
                text: self.text.clone(),
                audio: self.audio.clone(),
                video: self.video.clone(),
                assembler: self.assembler.clone(),
                probe: self.probe.clone(),
            };
            let fallback = FallbackTemplates::new(
                vec!["Pro fallback A on {topic}".into(), "Pro fallback B on {topic}".into()],
                vec!["Con fallback A on {topic}".into(), "Con fallback B on {topic}".into()],
            )
            .unwrap();
            DebateGenerator::new(services, fallback, self.settings.clone())
        }

        fn work_dir_is_empty(&self) -> bool {
            std::fs::read_dir(&self.settings.work_dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(true)
        }
    }

    #[tokio::test]
    async fn test_single_round_all_stages_succeed() {
        let harness = Harness::new();
        let result = harness.generator().generate_debate("X", 1).await.unwrap();

        assert_eq!(result.planned_turns, 2);
        assert_eq!(result.clip_ids, vec!["pro_0", "con_0"]);
        assert!(result.video_path.exists());
        assert!(
            result
                .video_path
                .to_string_lossy()
                .contains(&result.session_id)
        );

        // Clips lived in a directory namespaced by the session id
        let dirs = harness.assembler.session_dirs.lock().unwrap().clone();
        assert!(dirs.iter().all(|d| {
            d.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&result.session_id)
        }));
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_context_contains_only_earlier_turns() {
        let harness = Harness::new();
        harness.generator().generate_debate("X", 2).await.unwrap();

        let contexts = harness.text.contexts();
        assert_eq!(contexts.len(), 4);
        assert_eq!(contexts[0], "");
        assert_eq!(contexts[1], "Pro: Generated argument number 0 for pro\n");
        assert_eq!(
            contexts[3],
            "Pro: Generated argument number 0 for pro\n\
             Con: Generated argument number 1 for con\n\
             Pro: Generated argument number 2 for pro\n"
        );
    }

    #[tokio::test]
    async fn test_context_keeps_text_of_turns_dropped_later() {
        let mut harness = Harness::new();
        harness.audio = Arc::new(FakeAudio {
            fail_for_text: Mutex::new(vec!["number 0 ".into()]),
            undersized: false,
        });
        let result = harness.generator().generate_debate("X", 1).await.unwrap();

        assert_eq!(result.clip_ids, vec!["con_0"]);
        assert!(harness.text.contexts()[1].contains("number 0 for pro"));
    }

    #[tokio::test]
    async fn test_text_failure_uses_rotating_fallback() {
        let mut harness = Harness::new();
        harness.text = Arc::new(ScriptedText::failing(&[0, 1, 2, 3, 4]));
        let generator = harness.generator();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let generator = generator.with_callback(Box::new(move |event| {
            if let DebateEvent::TextReady {
                content, fallback, ..
            } = event
            {
                sink.lock().unwrap().push((content, fallback));
            }
        }));

        generator.generate_debate("Remote Work", 3).await.unwrap();

        let texts = events.lock().unwrap().clone();
        let expected = [
            ("Pro fallback A on remote work", true),
            ("Con fallback A on remote work", true),
            ("Pro fallback B on remote work", true),
            ("Con fallback B on remote work", true),
            ("Pro fallback A on remote work", true),
            ("Generated argument number 5 for con", false),
        ];
        let texts: Vec<(&str, bool)> = texts.iter().map(|(t, f)| (t.as_str(), *f)).collect();
        assert_eq!(texts, expected);

        // Fallback text still feeds the next turn's context
        assert!(harness.text.contexts()[1].starts_with("Pro: Pro fallback A"));
    }

    #[tokio::test]
    async fn test_fallback_selection_is_reproducible() {
        let run = || async {
            let mut harness = Harness::new();
            harness.text = Arc::new(ScriptedText::failing(&[1, 3]));
            let generator = harness.generator();
            generator.generate_debate("Topic", 2).await.unwrap();
            harness.text.contexts()[3].clone()
        };
        assert_eq!(run().await, run().await);
    }

    #[tokio::test]
    async fn test_fallback_rotation_counts_earlier_accepted_turns() {
        let mut harness = Harness::new();
        // pro_0 and con_0 succeed, pro_1 fails
        harness.text = Arc::new(ScriptedText::failing(&[2]));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let generator = harness.generator().with_callback(Box::new(move |event| {
            if let DebateEvent::TextReady {
                turn_id,
                content,
                fallback,
                ..
            } = event
            {
                sink.lock().unwrap().push((turn_id, content, fallback));
            }
        }));

        generator.generate_debate("X", 2).await.unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(events[2].0, "pro_1");
        assert_eq!(events[2].1, "Pro fallback B on x");
        assert!(events[2].2);
        assert!(!events[0].2 && !events[1].2 && !events[3].2);
    }

    #[tokio::test]
    async fn test_text_retries_fit_inside_stage_timeout() {
        use crate::services::OpenAiTextService;
        use std::sync::atomic::{AtomicUsize, Ordering};

        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let mut config = crate::config::default_config();
        config.services.api_base = format!("http://{}/v1", addr);
        config.services.text_timeout_secs = 1;
        config.services.text_retries = 3;

        let harness = Harness::new();
        let mut generator = harness.generator();
        generator.services.text =
            Arc::new(OpenAiTextService::new(&config.services, &config.prompts).unwrap());
        generator.settings.text_timeout = GeneratorSettings::from_config(&config).text_timeout;

        let request = TextRequest {
            topic: "X".into(),
            position: SpeakerRole::Pro,
            context: String::new(),
        };
        assert!(generator.generate_text(&request).await.is_err());
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_text_triggers_fallback() {
        struct Ellipsis;

        #[async_trait]
        impl TextService for Ellipsis {
            async fn generate(&self, _request: &TextRequest) -> Result<String, StageError> {
                Ok("...".to_string())
            }
        }

        let harness = Harness::new();
        let mut generator = harness.generator();
        generator.services.text = Arc::new(Ellipsis);
        let fallbacks = Arc::new(Mutex::new(Vec::new()));
        let sink = fallbacks.clone();
        let generator = generator.with_callback(Box::new(move |event| {
            if let DebateEvent::TextReady { fallback, .. } = event {
                sink.lock().unwrap().push(fallback);
            }
        }));

        generator.generate_debate("X", 1).await.unwrap();
        assert_eq!(*fallbacks.lock().unwrap(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_audio_failure_drops_only_that_turn() {
        let mut harness = Harness::new();
        // con_1 is the fourth text call
        harness.audio = Arc::new(FakeAudio {
            fail_for_text: Mutex::new(vec!["number 3 ".into()]),
            undersized: false,
        });
        let result = harness.generator().generate_debate("X", 2).await.unwrap();

        assert_eq!(result.planned_turns, 4);
        assert_eq!(result.clip_ids, vec!["pro_0", "con_0", "pro_1"]);
        assert_eq!(
            *harness.assembler.received.lock().unwrap(),
            vec!["pro_0", "con_0", "pro_1"]
        );
    }

    #[tokio::test]
    async fn test_video_failure_keeps_surrounding_clips_in_order() {
        let mut harness = Harness::new();
        harness.video = Arc::new(FakeVideo {
            failing_calls: [1].into_iter().collect(),
            ..FakeVideo::default()
        });

        let dropped = Arc::new(Mutex::new(Vec::new()));
        let sink = dropped.clone();
        let generator = harness.generator().with_callback(Box::new(move |event| {
            if let DebateEvent::TurnDropped { turn_id, stage, .. } = event {
                sink.lock().unwrap().push((turn_id, stage));
            }
        }));

        let result = generator.generate_debate("X", 2).await.unwrap();
        assert_eq!(result.clip_ids, vec!["pro_0", "pro_1", "con_1"]);
        assert_eq!(
            *dropped.lock().unwrap(),
            vec![("con_0".to_string(), PipelineStage::Video)]
        );
    }

    #[tokio::test]
    async fn test_all_turns_failing_is_no_clips_without_assembly() {
        let mut harness = Harness::new();
        harness.audio = Arc::new(FakeAudio {
            undersized: true,
            ..FakeAudio::default()
        });
        let err = harness
            .generator()
            .generate_debate("X", 2)
            .await
            .unwrap_err();

        assert!(matches!(err, DebateError::NoClips { planned: 4 }));
        assert_eq!(err.kind(), "no_clips");
        assert!(harness.assembler.received.lock().unwrap().is_empty());
        assert!(harness.work_dir_is_empty());
    }

    #[tokio::test]
    async fn test_zero_rounds_is_no_clips() {
        let harness = Harness::new();
        let err = harness.generator().generate_debate("X", 0).await.unwrap_err();
        assert!(matches!(err, DebateError::NoClips { planned: 0 }));
    }

    #[tokio::test]
    async fn test_empty_topic_rejected_before_any_call() {
        let harness = Harness::new();
        let err = harness
            .generator()
            .generate_debate("   ", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::EmptyTopic));
        assert!(harness.text.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_reference_image_is_configuration_error() {
        let mut harness = Harness::new();
        harness
            .settings
            .reference_images
            .insert(SpeakerRole::Con, PathBuf::from("/nonexistent/person2.jpg"));
        let err = harness
            .generator()
            .generate_debate("X", 1)
            .await
            .unwrap_err();

        match err {
            DebateError::MissingReferenceImage { role, path } => {
                assert_eq!(role, SpeakerRole::Con);
                assert_eq!(path, PathBuf::from("/nonexistent/person2.jpg"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(harness.text.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_encode_failure_is_distinct_and_cleans_up() {
        let mut harness = Harness::new();
        harness.assembler = Arc::new(RecordingAssembler {
            fail: true,
            ..RecordingAssembler::default()
        });
        let err = harness
            .generator()
            .generate_debate("X", 1)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "encode_failed");
        assert!(harness.work_dir_is_empty());
        let leftovers = std::fs::read_dir(&harness.settings.output_dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_non_positive_duration_drops_turn() {
        let mut harness = Harness::new();
        harness.probe = Some(Arc::new(FixedProbe(Some(0.0))));
        let err = harness
            .generator()
            .generate_debate("X", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::NoClips { planned: 2 }));
    }

    #[tokio::test]
    async fn test_probed_duration_recorded() {
        let mut harness = Harness::new();
        harness.probe = Some(Arc::new(FixedProbe(Some(4.5))));
        harness.generator().generate_debate("X", 1).await.unwrap();
        assert_eq!(harness.assembler.received.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_clips_are_resorted_into_turn_order() {
        /// Later turns finish first.
        struct SlowEarlyAudio;

        #[async_trait]
        impl AudioService for SlowEarlyAudio {
            async fn synthesize(&self, text: &str, _role: SpeakerRole) -> Result<Vec<u8>, StageError> {
                let index: u64 = text
                    .split_whitespace()
                    .nth(3)
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(40 - index * 10)).await;
                Ok(AUDIO.to_vec())
            }
        }

        let mut harness = Harness::new();
        harness.settings.clip_concurrency = 4;
        let mut generator = harness.generator();
        generator.services.audio = Arc::new(SlowEarlyAudio);

        let result = generator.generate_debate("X", 2).await.unwrap();
        assert_eq!(result.clip_ids, vec!["pro_0", "con_0", "pro_1", "con_1"]);
        assert_eq!(
            *harness.assembler.received.lock().unwrap(),
            vec!["pro_0", "con_0", "pro_1", "con_1"]
        );
    }

    #[tokio::test]
    async fn test_stage_timeout_drops_turn() {
        struct HangingVideo;

        #[async_trait]
        impl VideoService for HangingVideo {
            async fn lipsync(&self, _image: &[u8], _audio: &[u8]) -> Result<Vec<u8>, StageError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(VIDEO.to_vec())
            }
        }

        let mut harness = Harness::new();
        harness.settings.video_timeout = Duration::from_millis(20);
        let mut generator = harness.generator();
        generator.services.video = Arc::new(HangingVideo);

        let err = generator.generate_debate("X", 1).await.unwrap_err();
        assert!(matches!(err, DebateError::NoClips { .. }));
    }

    #[test]
    fn test_output_path_uses_session_id() {
        let path = output_path(Path::new("/app/output"), "abc");
        assert_eq!(path, PathBuf::from("/app/output/abc_debate.mp4"));
    }
}
