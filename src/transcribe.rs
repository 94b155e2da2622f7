//! Speech-to-text
//!
//! The transcription engine is an external service. [`WhisperHttpTranscriber`]
//! talks to any OpenAI-compatible Whisper server (faster-whisper-server,
//! whisper.cpp server, `OpenAI` itself) using `verbose_json` segments.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::voice::AudioClip;
use crate::{Error, Result};

/// Per-request timeout for transcription uploads
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for the startup reachability check
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A timed piece of transcribed speech
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Segment {
    /// Start offset in seconds
    #[serde(default)]
    pub start: f64,
    /// End offset in seconds
    #[serde(default)]
    pub end: f64,
    /// Recognized text
    pub text: String,
}

/// Text recognized from one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Segment texts joined with single spaces
    pub text: String,
    /// Time from submitting the clip to receiving the text
    pub latency: Duration,
}

impl Transcript {
    /// Join segments in order with single spaces
    #[must_use]
    pub fn from_segments(segments: &[Segment], latency: Duration) -> Self {
        let text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self { text, latency }
    }

    /// Whether nothing was recognized
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Converts recorded clips to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe a clip into ordered segments
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the engine fails
    async fn transcribe(&self, clip: &AudioClip) -> Result<Vec<Segment>>;
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Option<Vec<Segment>>,
}

/// OpenAI-compatible Whisper server client
pub struct WhisperHttpTranscriber {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    language: Option<String>,
}

impl std::fmt::Debug for WhisperHttpTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperHttpTranscriber")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl WhisperHttpTranscriber {
    /// Create a client without contacting the server
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            language: None,
        })
    }

    /// Create a client and verify the server answers
    ///
    /// This is the startup check: failure here means the assistant cannot
    /// run at all.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the server is unreachable or refuses
    pub async fn connect(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self> {
        let transcriber = Self::new(base_url, model, api_key)?;
        transcriber.check().await?;
        Ok(transcriber)
    }

    /// Force a language instead of letting the server detect it
    #[must_use]
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Probe `GET {base}/models`
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the probe fails
    pub async fn check(&self) -> Result<()> {
        let mut request = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(CONNECT_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            Error::Transcription(format!("server at {} unreachable: {e}", self.base_url))
        })?;

        if !response.status().is_success() {
            return Err(Error::Transcription(format!(
                "server at {} returned {}",
                self.base_url,
                response.status()
            )));
        }

        tracing::info!(base_url = %self.base_url, model = %self.model, "transcription server ready");
        Ok(())
    }
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
    async fn transcribe(&self, clip: &AudioClip) -> Result<Vec<Segment>> {
        let bytes = tokio::fs::read(clip.path()).await?;
        let file_name = clip
            .path()
            .file_name()
            .map_or_else(|| "recording.wav".to_string(), |n| n.to_string_lossy().to_string());

        let file = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!("server returned {status}: {body}")));
        }

        let body: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("unexpected response: {e}")))?;

        Ok(segments_of(body))
    }
}

/// Segments from a verbose response, or the plain text as a single segment
fn segments_of(body: VerboseTranscription) -> Vec<Segment> {
    match body.segments {
        Some(segments) if !segments.is_empty() => segments,
        _ if body.text.trim().is_empty() => Vec::new(),
        _ => vec![Segment {
            start: 0.0,
            end: 0.0,
            text: body.text,
        }],
    }
}
