//! Turn state machine and per-turn report

use std::fmt;
use std::time::Duration;

use crate::generate::GenerationResult;
use crate::language::LanguageTag;

/// Where the orchestrator is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnState {
    /// Waiting for a trigger
    Idle,
    /// Recording the utterance
    Capturing,
    /// Converting audio to text
    Transcribing,
    /// Waiting on the generation backend
    Generating,
    /// Producing speech audio
    Synthesizing,
    /// Playing speech audio
    Playing,
    /// Leaving the loop
    Exiting,
}

impl TurnState {
    /// Whether `next` may follow `self`
    ///
    /// Every stage can fall back to `Idle`; `Exiting` is only reachable
    /// from `Idle`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Capturing | Self::Exiting)
                | (Self::Capturing, Self::Transcribing | Self::Idle)
                | (Self::Transcribing, Self::Generating | Self::Idle)
                | (Self::Generating, Self::Synthesizing | Self::Idle)
                | (Self::Synthesizing, Self::Playing | Self::Idle)
                | (Self::Playing, Self::Idle)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Synthesizing => "synthesizing",
            Self::Playing => "playing",
            Self::Exiting => "exiting",
        };
        f.write_str(name)
    }
}

/// What to do when nothing was recognized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyTranscriptPolicy {
    /// End the turn without generating
    #[default]
    Skip,
    /// Send the empty text to the generation backend anyway
    Forward,
}

impl std::str::FromStr for EmptyTranscriptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "forward" => Ok(Self::Forward),
            other => Err(format!("unknown empty transcript policy: {other}")),
        }
    }
}

/// Measured stage durations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// Recording the clip
    pub capture: Duration,
    /// Speech to text
    pub transcription: Duration,
    /// Reply generation, retries included
    pub generation: Duration,
    /// Text to speech
    pub synthesis: Duration,
    /// Playing the artifact
    pub playback: Duration,
}

impl StageTimings {
    /// Transcription plus generation
    #[must_use]
    pub fn total_processing(&self) -> Duration {
        self.transcription + self.generation
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply generated, synthesized and played
    Completed,
    /// Nothing was recognized and the turn was skipped
    Silent,
    /// A reply was produced but could not be spoken
    Unspoken(String),
    /// The turn stopped before a reply was produced
    Abandoned(String),
}

impl TurnOutcome {
    /// Whether the reply was heard
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Aggregate of one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Recognized text, if transcription ran
    pub transcript: Option<String>,
    /// Generation outcome, if generation ran
    pub reply: Option<GenerationResult>,
    /// Language detected from the reply
    pub language: Option<LanguageTag>,
    pub timings: StageTimings,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    /// Report for a turn that stopped early
    #[must_use]
    pub fn abandoned(reason: impl Into<String>, timings: StageTimings) -> Self {
        Self {
            transcript: None,
            reply: None,
            language: None,
            timings,
            outcome: TurnOutcome::Abandoned(reason.into()),
        }
    }
}

impl fmt::Display for TurnReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(transcript) = &self.transcript {
            writeln!(f, "You said: {transcript}")?;
        }
        if let Some(reply) = &self.reply {
            writeln!(f, "Assistant: {}", reply.text)?;
        }
        if let Some(language) = self.language {
            writeln!(f, "Detected language: {language}")?;
        }

        match &self.outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::Silent => writeln!(f, "No speech detected")?,
            TurnOutcome::Unspoken(reason) => writeln!(f, "Could not speak reply: {reason}")?,
            TurnOutcome::Abandoned(reason) => writeln!(f, "Turn abandoned: {reason}")?,
        }

        let t = &self.timings;
        writeln!(f, "Processing times:")?;
        writeln!(f, "  transcription:    {:.2}s", t.transcription.as_secs_f64())?;
        writeln!(f, "  generation:       {:.2}s", t.generation.as_secs_f64())?;
        writeln!(f, "  synthesis:        {:.2}s", t.synthesis.as_secs_f64())?;
        writeln!(f, "  playback:         {:.2}s", t.playback.as_secs_f64())?;
        write!(f, "  total processing: {:.2}s", t.total_processing().as_secs_f64())
    }
}
