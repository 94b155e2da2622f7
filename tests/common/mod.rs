//! Shared test utilities
//!
//! In-memory stand-ins for the audio devices and remote services so turns can
//! run without hardware or network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use talkback::generate::{OutboundRequest, Transport, TransportResponse};
use talkback::language::{DetectionError, LanguageDetector};
use talkback::transcribe::Segment;
use talkback::tts::AudioFormat;
use talkback::voice::{AudioSink, ClipFormat, DecodedAudio};
use talkback::{AudioClip, Error, Recorder, Result, SynthesisArtifact, Synthesizer, Transcriber, VoiceSelection};

/// Encode mono 16-bit samples as WAV bytes
#[must_use]
pub fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
        for sample in samples {
            writer.write_sample(*sample).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }
    cursor.into_inner()
}

/// Number of entries left in a directory
#[must_use]
pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("read dir").count()
}

/// Gemini response body carrying `text`
#[must_use]
pub fn gemini_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]
    })
    .to_string()
}

/// Recorder writing a short clip into a directory
pub struct FakeRecorder {
    dir: PathBuf,
    fail: bool,
    pub calls: Mutex<u32>,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl FakeRecorder {
    #[must_use]
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: false,
            calls: Mutex::new(0),
            paths: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: true,
            calls: Mutex::new(0),
            paths: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn record(&self, _duration: Duration) -> Result<AudioClip> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(Error::Device("no input device available".to_string()));
        }

        let clip = AudioClip::write(vec![0, 1200, -1200, 0], ClipFormat::SPEECH, &self.dir)?;
        self.paths.lock().unwrap().push(clip.path().to_path_buf());
        Ok(clip)
    }
}

/// Transcriber returning fixed segments, or failing when `None`
pub struct FakeTranscriber {
    segments: Option<Vec<String>>,
    pub calls: Mutex<u32>,
    /// Whether the clip file existed when transcription ran
    pub saw_file: Mutex<Vec<bool>>,
}

impl FakeTranscriber {
    #[must_use]
    pub fn saying(segments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            segments: Some(segments.iter().map(ToString::to_string).collect()),
            calls: Mutex::new(0),
            saw_file: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            segments: None,
            calls: Mutex::new(0),
            saw_file: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Vec<Segment>> {
        *self.calls.lock().unwrap() += 1;
        self.saw_file.lock().unwrap().push(clip.path().exists());

        let Some(segments) = &self.segments else {
            return Err(Error::Transcription("model crashed".to_string()));
        };

        Ok(segments
            .iter()
            .enumerate()
            .map(|(i, text)| Segment {
                start: i as f64,
                end: i as f64 + 1.0,
                text: text.clone(),
            })
            .collect())
    }
}

/// Transport answering from a script; an exhausted script refuses connections
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<TransportResponse>>,
    pub requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn replying(bodies: &[String]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                bodies
                    .iter()
                    .map(|body| TransportResponse {
                        status: 200,
                        body: body.clone(),
                    })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn refusing() -> Arc<Self> {
        Self::replying(&[])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, request: &OutboundRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Network("connection refused".to_string()))
    }
}

/// Detector returning a fixed code and recording what it was asked about
pub struct FixedDetector {
    code: &'static str,
    pub inputs: Arc<Mutex<Vec<String>>>,
}

impl FixedDetector {
    #[must_use]
    pub fn new(code: &'static str) -> (Box<Self>, Arc<Mutex<Vec<String>>>) {
        let inputs = Arc::new(Mutex::new(Vec::new()));
        (
            Box::new(Self {
                code,
                inputs: inputs.clone(),
            }),
            inputs,
        )
    }
}

impl LanguageDetector for FixedDetector {
    fn detect(&self, text: &str) -> std::result::Result<String, DetectionError> {
        self.inputs.lock().unwrap().push(text.to_string());
        Ok(self.code.to_string())
    }
}

/// Synthesizer writing a short WAV artifact
pub struct FakeSynthesizer {
    dir: PathBuf,
    fail: bool,
    pub requests: Mutex<Vec<(String, VoiceSelection)>>,
    pub paths: Mutex<Vec<PathBuf>>,
}

impl FakeSynthesizer {
    #[must_use]
    pub fn new(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: false,
            requests: Mutex::new(Vec::new()),
            paths: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn failing(dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.to_path_buf(),
            fail: true,
            requests: Mutex::new(Vec::new()),
            paths: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<(String, VoiceSelection)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<SynthesisArtifact> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), *voice));
        if self.fail {
            return Err(Error::Synthesis("401 Unauthorized".to_string()));
        }

        let artifact = SynthesisArtifact::write(
            &wav_bytes(&[0, 8000, 16000, 8000, 0], 24000),
            AudioFormat::Wav,
            &self.dir,
        )?;
        self.paths.lock().unwrap().push(artifact.path().to_path_buf());
        Ok(artifact)
    }
}

/// Sink that records what it was asked to play
#[derive(Default)]
pub struct RecordingSink {
    fail: bool,
    pub played: Mutex<Vec<DecodedAudio>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            played: Mutex::new(Vec::new()),
        })
    }

    pub fn plays(&self) -> usize {
        self.played.lock().unwrap().len()
    }
}

impl AudioSink for RecordingSink {
    fn play_blocking(&self, audio: &DecodedAudio) -> Result<()> {
        if self.fail {
            return Err(Error::Device("output device disconnected".to_string()));
        }
        self.played.lock().unwrap().push(audio.clone());
        Ok(())
    }
}
