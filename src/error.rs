//! Error types for talkback

use thiserror::Error;

/// Result type alias for talkback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or failing (fatal to the current turn only)
    #[error("device error: {0}")]
    Device(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Connection failure, bad status or malformed response
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Text-to-speech backend failure
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Decoding or output failure while playing an artifact
    #[error("playback error: {0}")]
    Playback(String),

    /// Local inference server supervision error
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WAV encoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}
