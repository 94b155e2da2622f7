//! Language-code driven text-to-speech
//!
//! Uses the Google Translate speech endpoint, which only takes a language
//! code and at most ~200 characters per request. Longer replies are split on
//! whitespace and the MP3 bodies concatenated.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::{AudioFormat, SynthesisArtifact, Synthesizer};
use crate::language::VoiceSelection;
use crate::{Error, Result};

/// Default speech endpoint
const DEFAULT_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Longest text accepted per request
pub const MAX_CHUNK_CHARS: usize = 200;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Translate-style speech synthesis client
#[derive(Debug, Clone)]
pub struct TranslateTts {
    client: reqwest::Client,
    endpoint: String,
    output_dir: PathBuf,
}

impl TranslateTts {
    /// Create a client for the public endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT, output_dir)
    }

    /// Create a client against an explicit endpoint URL
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_endpoint(endpoint: impl Into<String>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("talkback/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            output_dir: output_dir.into(),
        })
    }

    async fn fetch_chunk(&self, chunk: &str, index: usize, total: usize, lang: &str) -> Result<Vec<u8>> {
        let idx = index.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", chunk),
                ("idx", idx.as_str()),
                ("total", total.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("speech request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Synthesis(format!(
                "speech endpoint returned {status} for chunk {index}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("speech body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Synthesizer for TranslateTts {
    fn name(&self) -> &'static str {
        "translate"
    }

    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<SynthesisArtifact> {
        let lang = voice.language_code();
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(Error::Synthesis("nothing to speak".to_string()));
        }

        tracing::debug!(lang, chunks = chunks.len(), "translate synthesis");

        let mut audio = Vec::new();
        for (index, chunk) in chunks.iter().enumerate() {
            audio.extend(self.fetch_chunk(chunk, index, chunks.len(), lang).await?);
        }

        if audio.is_empty() {
            return Err(Error::Synthesis("speech endpoint returned no audio".to_string()));
        }

        SynthesisArtifact::write(&audio, AudioFormat::Mp3, &self.output_dir)
    }
}

/// Split text into whitespace-delimited pieces of at most `max_chars` characters
///
/// Words longer than `max_chars` are cut at character boundaries.
#[must_use]
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() { word_len } else { word_len + 1 };
        if current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}
