//! Turn orchestration
//!
//! Sequences capture, transcription, generation, voice selection, synthesis
//! and playback for each trigger. No stage failure ends the loop: a failed
//! turn is reported and the orchestrator goes back to waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::generate::{GenerationResult, ResponseClient};
use crate::language::LanguageRouter;
use crate::sidecar::SidecarManager;
use crate::transcribe::{Transcriber, Transcript};
use crate::trigger::{TriggerSignal, TurnTrigger};
use crate::tts::Synthesizer;
use crate::turn::{EmptyTranscriptPolicy, StageTimings, TurnOutcome, TurnReport, TurnState};
use crate::voice::{AudioClip, PlaybackController, Recorder};

/// Default recording length per turn
pub const DEFAULT_RECORD_DURATION: Duration = Duration::from_secs(5);

/// Per-turn behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    /// How long to record after the trigger
    pub record_duration: Duration,
    /// What to do when nothing was recognized
    pub empty_transcript: EmptyTranscriptPolicy,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            record_duration: DEFAULT_RECORD_DURATION,
            empty_transcript: EmptyTranscriptPolicy::default(),
        }
    }
}

/// Collaborators driven by the orchestrator
pub struct Pipeline {
    /// Captures the user's speech
    pub recorder: Arc<dyn Recorder>,
    /// Turns a clip into text
    pub transcriber: Arc<dyn Transcriber>,
    /// Produces the reply
    pub responder: ResponseClient,
    /// Picks the voice from the reply language
    pub router: LanguageRouter,
    /// Speaks the reply
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Plays and discards the speech artifact
    pub playback: PlaybackController,
    /// Restarted when the local provider stops answering
    pub sidecar: Option<SidecarManager>,
}

/// Drives turns until the trigger says quit
pub struct TurnOrchestrator {
    pipeline: Pipeline,
    settings: TurnSettings,
}

/// Tracks and validates state changes within a turn
struct StateTracker {
    state: TurnState,
}

impl StateTracker {
    const fn new() -> Self {
        Self {
            state: TurnState::Idle,
        }
    }

    fn enter(&mut self, next: TurnState) {
        if self.state.can_transition_to(next) {
            tracing::debug!(from = %self.state, to = %next, "turn state");
        } else {
            tracing::error!(from = %self.state, to = %next, "invalid turn transition");
        }
        self.state = next;
    }
}

impl TurnOrchestrator {
    /// Create an orchestrator over `pipeline`
    #[must_use]
    pub const fn new(pipeline: Pipeline, settings: TurnSettings) -> Self {
        Self { pipeline, settings }
    }

    /// Run turns until `trigger` yields [`TriggerSignal::Quit`]
    ///
    /// Each turn's report is printed to stdout.
    pub async fn run(&self, trigger: &mut dyn TurnTrigger) {
        let mut turns = 0_u32;
        let mut state = StateTracker::new();

        loop {
            match trigger.next_signal().await {
                TriggerSignal::Begin => {
                    turns += 1;
                    let report = self.run_turn().await;
                    tracing::info!(turn = turns, outcome = ?report.outcome, "turn finished");
                    println!("\n{report}");
                }
                TriggerSignal::Quit => {
                    state.enter(TurnState::Exiting);
                    tracing::info!(turns, "exiting");
                    return;
                }
            }
        }
    }

    /// Run one capture-to-playback turn
    ///
    /// Never fails: stage errors are logged and reflected in the report's
    /// outcome. The recorded clip and synthesized artifact are deleted
    /// before this returns.
    pub async fn run_turn(&self) -> TurnReport {
        let mut state = StateTracker::new();
        let mut timings = StageTimings::default();

        state.enter(TurnState::Capturing);
        let started = Instant::now();
        let clip = match self.pipeline.recorder.record(self.settings.record_duration).await {
            Ok(clip) => clip,
            Err(e) => {
                tracing::error!(error = %e, "capture failed");
                state.enter(TurnState::Idle);
                return TurnReport::abandoned(format!("capture failed: {e}"), timings);
            }
        };
        timings.capture = started.elapsed();

        state.enter(TurnState::Transcribing);
        let started = Instant::now();
        let segments = self.pipeline.transcriber.transcribe(&clip).await;
        timings.transcription = started.elapsed();
        discard_clip(clip);

        let transcript = match segments {
            Ok(segments) => Transcript::from_segments(&segments, timings.transcription),
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                state.enter(TurnState::Idle);
                return TurnReport::abandoned(format!("transcription failed: {e}"), timings);
            }
        };
        tracing::info!(text = %transcript.text, latency = ?transcript.latency, "transcribed");

        if transcript.is_blank() && self.settings.empty_transcript == EmptyTranscriptPolicy::Skip {
            tracing::info!("no speech recognized, skipping turn");
            state.enter(TurnState::Idle);
            return TurnReport {
                transcript: Some(transcript.text),
                reply: None,
                language: None,
                timings,
                outcome: TurnOutcome::Silent,
            };
        }

        state.enter(TurnState::Generating);
        let started = Instant::now();
        let reply = self.generate(&transcript.text).await;
        timings.generation = started.elapsed();

        let voice = self.pipeline.router.detect_voice(&reply.text);
        tracing::debug!(language = %voice.tag, voice = voice.neural_voice, "voice selected");

        state.enter(TurnState::Synthesizing);
        let started = Instant::now();
        let artifact = self.pipeline.synthesizer.synthesize(&reply.text, &voice).await;
        timings.synthesis = started.elapsed();

        let outcome = match artifact {
            Ok(artifact) => {
                state.enter(TurnState::Playing);
                let started = Instant::now();
                let played = self.pipeline.playback.play(artifact).await;
                timings.playback = started.elapsed();

                match played {
                    Ok(()) => TurnOutcome::Completed,
                    Err(e) => {
                        tracing::error!(error = %e, "playback failed");
                        TurnOutcome::Unspoken(format!("playback failed: {e}"))
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    backend = self.pipeline.synthesizer.name(),
                    error = %e,
                    "synthesis failed"
                );
                TurnOutcome::Unspoken(format!("synthesis failed: {e}"))
            }
        };

        state.enter(TurnState::Idle);
        TurnReport {
            transcript: Some(transcript.text),
            reply: Some(reply),
            language: Some(voice.tag),
            timings,
            outcome,
        }
    }

    /// Generate a reply, restarting the local server first if it is down
    async fn generate(&self, text: &str) -> GenerationResult {
        let responder = &self.pipeline.responder;

        if responder.provider().is_local()
            && let Some(sidecar) = &self.pipeline.sidecar
            && !sidecar.is_healthy().await
        {
            let started = Instant::now();
            tracing::warn!("inference server not responding, restarting");
            if !sidecar.ensure_running().await {
                tracing::error!("inference server not ready, using fallback reply");
                return responder.fallback_result(0, started.elapsed());
            }
        }

        responder.generate(text).await
    }
}

fn discard_clip(clip: AudioClip) {
    let path = clip.path().to_path_buf();
    if let Err(e) = clip.discard() {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove recording");
    }
}
