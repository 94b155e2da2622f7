//! Talkback - push-to-talk voice assistant
//!
//! Each turn records a fixed-length clip, transcribes it, asks a language
//! model for a reply, picks a voice from the reply's language, synthesizes
//! speech and plays it back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      TurnOrchestrator                        │
//! │  Idle → Capturing → Transcribing → Generating → Synthesizing │
//! │        → Playing → Idle            (Quit: Idle → Exiting)    │
//! └───────┬──────────┬─────────────┬─────────────┬──────────┬────┘
//!         │          │             │             │          │
//!    AudioRecorder Transcriber ResponseClient LanguageRouter Synthesizer
//!      (cpal)     (Whisper HTTP) (Gemini/Ollama) (whatlang)  (Azure/Translate)
//!                                     │                         │
//!                              SidecarManager           PlaybackController
//!                              (ollama serve)                 (cpal)
//! ```

pub mod config;
pub mod error;
pub mod generate;
pub mod language;
pub mod orchestrator;
pub mod sidecar;
pub mod transcribe;
pub mod trigger;
pub mod tts;
pub mod turn;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use generate::{GenerationResult, Provider, ResponseClient, RetryPolicy, strip_markup};
pub use language::{LanguageRouter, LanguageTag, VoiceSelection};
pub use orchestrator::{Pipeline, TurnOrchestrator, TurnSettings};
pub use sidecar::SidecarManager;
pub use transcribe::{Transcriber, Transcript, WhisperHttpTranscriber};
pub use trigger::{ChannelTrigger, StdinTrigger, TriggerSignal, TurnTrigger};
pub use tts::{SynthesisArtifact, Synthesizer};
pub use turn::{EmptyTranscriptPolicy, StageTimings, TurnOutcome, TurnReport, TurnState};
pub use voice::{AudioClip, AudioRecorder, PlaybackController, Recorder};
