//! Text-to-speech backends
//!
//! Each backend turns text plus a [`VoiceSelection`] into a
//! [`SynthesisArtifact`]: a uniquely named temporary audio file owned by the
//! current turn. The backend is chosen once at startup.

mod azure;
mod translate;

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use tempfile::NamedTempFile;

pub use azure::{AZURE_OUTPUT_FORMAT, AzureTts, escape_xml};
pub use translate::{MAX_CHUNK_CHARS, TranslateTts, split_text};

use crate::language::VoiceSelection;
use crate::Result;

/// Container format of synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MPEG layer III
    Mp3,
    /// RIFF WAVE
    Wav,
}

impl AudioFormat {
    /// File extension including the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => ".mp3",
            Self::Wav => ".wav",
        }
    }
}

/// Synthesized speech on disk, scoped to one turn
///
/// Dropping the artifact deletes the file.
#[derive(Debug)]
pub struct SynthesisArtifact {
    file: NamedTempFile,
    format: AudioFormat,
}

impl SynthesisArtifact {
    /// Persist audio bytes to a new `speech_<timestamp>_<random>` file in `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written
    pub fn write(bytes: &[u8], format: AudioFormat, dir: &Path) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut file = tempfile::Builder::new()
            .prefix(&format!("speech_{stamp}_"))
            .suffix(format.extension())
            .tempfile_in(dir)?;

        file.write_all(bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = bytes.len(), "artifact written");
        Ok(Self { file, format })
    }

    /// Location of the audio file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Container format
    #[must_use]
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Delete the file now
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be removed
    pub fn discard(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        tracing::debug!(path = %path.display(), "artifact removed");
        Ok(())
    }
}

/// Converts text to speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Synthesize `text` with `voice`
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the backend fails
    async fn synthesize(&self, text: &str, voice: &VoiceSelection) -> Result<SynthesisArtifact>;
}
