//! TOML configuration file loading
//!
//! Supports `~/.config/talkback/config.toml` as a persistent config source.
//! All fields are optional: the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TalkbackConfigFile {
    /// Microphone capture
    #[serde(default)]
    pub recording: RecordingFileConfig,

    /// Speech-to-text server
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// Reply generation backend
    #[serde(default)]
    pub generation: GenerationFileConfig,

    /// Text-to-speech backend
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Local inference server supervision
    #[serde(default)]
    pub sidecar: SidecarFileConfig,

    /// Turn behaviour
    #[serde(default)]
    pub turn: TurnFileConfig,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecordingFileConfig {
    /// Seconds recorded per turn
    pub duration_secs: Option<f64>,

    /// Directory for transient recordings and speech files
    pub work_dir: Option<String>,
}

/// Transcription server configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// OpenAI-compatible base URL (e.g. `http://localhost:8000/v1`)
    pub url: Option<String>,

    /// Model name (e.g. "base")
    pub model: Option<String>,

    /// Force a spoken language (ISO 639-1)
    pub language: Option<String>,

    pub api_key: Option<String>,
}

/// Generation configuration
#[derive(Debug, Default, Deserialize)]
pub struct GenerationFileConfig {
    /// "gemini" or "ollama"
    pub provider: Option<String>,

    pub gemini_model: Option<String>,
    pub gemini_api_key: Option<String>,

    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,

    /// Total attempts per reply
    pub max_attempts: Option<u32>,

    /// "fixed" or "exponential"
    pub backoff: Option<String>,

    /// Delay after the first failed attempt
    pub backoff_secs: Option<f64>,

    /// Cap for exponential backoff
    pub max_backoff_secs: Option<f64>,

    /// Per-attempt timeout
    pub timeout_secs: Option<f64>,

    /// Reply spoken when every attempt fails
    pub fallback_reply: Option<String>,
}

/// Synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// "azure" or "translate"
    pub backend: Option<String>,

    pub azure_region: Option<String>,
    pub azure_key: Option<String>,

    /// Override for the Translate TTS endpoint
    pub translate_url: Option<String>,
}

/// Sidecar configuration
#[derive(Debug, Default, Deserialize)]
pub struct SidecarFileConfig {
    /// Supervise the local server (defaults to on for the ollama provider)
    pub enabled: Option<bool>,

    /// Server base URL
    pub url: Option<String>,

    pub polls: Option<u32>,
    pub interval_secs: Option<f64>,
    pub settle_secs: Option<f64>,
}

/// Turn configuration
#[derive(Debug, Default, Deserialize)]
pub struct TurnFileConfig {
    /// "skip" or "forward"
    pub empty_transcript: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path
/// is used when present, and a broken standard file falls back to defaults
/// with a warning.
///
/// # Errors
///
/// Returns error if an explicit file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<TalkbackConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(TalkbackConfigFile::default());
    };

    if !path.exists() {
        return Ok(TalkbackConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TalkbackConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TalkbackConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/talkback/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("talkback").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let config: TalkbackConfigFile = toml::from_str("").unwrap();
        assert!(config.generation.provider.is_none());
        assert!(config.sidecar.enabled.is_none());
    }

    #[test]
    fn partial_sections() {
        let config: TalkbackConfigFile = toml::from_str(
            r#"
            [recording]
            duration_secs = 7.5

            [generation]
            provider = "ollama"
            ollama_model = "llama3.2"
            max_attempts = 4

            [turn]
            empty_transcript = "forward"
            "#,
        )
        .unwrap();

        assert_eq!(config.recording.duration_secs, Some(7.5));
        assert_eq!(config.generation.provider.as_deref(), Some("ollama"));
        assert_eq!(config.generation.max_attempts, Some(4));
        assert_eq!(config.turn.empty_transcript.as_deref(), Some("forward"));
        assert!(config.synthesis.backend.is_none());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = load_config_file(Some(Path::new("/nonexistent/talkback.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sidecar]\nenabled = false\n").unwrap();

        let config = load_config_file(Some(&path)).unwrap();
        assert_eq!(config.sidecar.enabled, Some(false));
    }

    #[test]
    fn explicit_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[generation\nprovider = ").unwrap();

        assert!(matches!(
            load_config_file(Some(&path)),
            Err(crate::Error::Toml(_))
        ));
    }
}
