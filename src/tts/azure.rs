//! Azure neural text-to-speech
//!
//! Voices are addressed by their neural name (e.g. `en-US-ChristopherNeural`)
//! through an SSML document.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{AudioFormat, SynthesisArtifact, Synthesizer};
use crate::language::VoiceSelection;
use crate::{Error, Result};

/// Requested output encoding
pub const AZURE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Azure Cognitive Services speech synthesis client
pub struct AzureTts {
    client: reqwest::Client,
    endpoint: String,
    key: SecretString,
    output_dir: PathBuf,
}

impl std::fmt::Debug for AzureTts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTts")
            .field("endpoint", &self.endpoint)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl AzureTts {
    /// Create a client for the given Azure region
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(region: &str, key: SecretString, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let endpoint = format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1");
        Self::with_endpoint(endpoint, key, output_dir)
    }

    /// Create a client against an explicit endpoint URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        key: SecretString,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("talkback/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            key,
            output_dir: output_dir.into(),
        })
    }

    /// Build the SSML request body
    #[must_use]
    pub fn ssml(text: &str, voice: &VoiceSelection) -> String {
        format!(
            "<speak version='1.0' xml:lang='{locale}'><voice name='{name}'>{body}</voice></speak>",
            locale = voice.locale(),
            name = voice.neural_voice,
            body = escape_xml(text),
        )
    }
}

#[async_trait]
impl Synthesizer for AzureTts {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<SynthesisArtifact> {
        tracing::debug!(voice = voice.neural_voice, chars = text.len(), "azure synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", self.key.expose_secret())
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .body(Self::ssml(text, voice))
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("azure request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("azure returned {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("azure body read failed: {e}")))?;

        if audio.is_empty() {
            return Err(Error::Synthesis("azure returned no audio".to_string()));
        }

        SynthesisArtifact::write(&audio, AudioFormat::Mp3, &self.output_dir)
    }
}

/// Escape text for inclusion in an XML element or single-quoted attribute
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
