//! Configuration management for talkback
//!
//! Values resolve as environment > config file > defaults. Secrets are only
//! ever read from the environment or the config file.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use crate::generate::{Backoff, FALLBACK_REPLY, Provider, RetryPolicy};
use crate::orchestrator::{DEFAULT_RECORD_DURATION, TurnSettings};
use crate::sidecar::{DEFAULT_BASE_URL, ReadinessPolicy};
use crate::tts::{AzureTts, Synthesizer, TranslateTts};
use crate::turn::EmptyTranscriptPolicy;
use crate::{Error, Result};

use file::TalkbackConfigFile;

/// Default transcription server
pub const DEFAULT_STT_URL: &str = "http://localhost:8000/v1";

/// Default transcription model
pub const DEFAULT_STT_MODEL: &str = "base";

/// Default Gemini model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Default local model
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

/// Default Azure speech region
pub const DEFAULT_AZURE_REGION: &str = "eastus";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// talkback configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Capture settings
    pub recording: RecordingConfig,

    /// Transcription server settings
    pub transcription: TranscriptionConfig,

    /// Reply generation settings
    pub generation: GenerationConfig,

    /// Synthesis backend
    pub synthesis: SynthesisBackend,

    /// Local inference server supervision
    pub sidecar: SidecarConfig,

    /// Turn behaviour
    pub turn: TurnSettings,
}

/// Capture configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Directory for transient recordings and speech files
    pub work_dir: PathBuf,
}

/// Transcription server configuration
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    /// OpenAI-compatible base URL
    pub url: String,

    pub model: String,

    /// Forced spoken language, if any
    pub language: Option<String>,

    /// Bearer token (from `TALKBACK_STT_API_KEY`)
    pub api_key: Option<SecretString>,
}

/// Generation configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub provider: Provider,
    pub retry: RetryPolicy,

    /// Reply used when every attempt fails
    pub fallback_reply: String,
}

/// Which synthesis backend to use
#[derive(Debug, Clone)]
pub enum SynthesisBackend {
    /// Azure neural voices
    Azure {
        region: String,
        /// Subscription key (from `AZURE_SPEECH_KEY`)
        key: SecretString,
    },
    /// Translate-style TTS keyed by language code
    Translate {
        /// Endpoint override
        endpoint: Option<String>,
    },
}

impl SynthesisBackend {
    /// Backend name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Azure { .. } => "azure",
            Self::Translate { .. } => "translate",
        }
    }

    /// Construct the configured backend writing artifacts into `work_dir`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn build(&self, work_dir: &Path) -> Result<Arc<dyn Synthesizer>> {
        let synthesizer: Arc<dyn Synthesizer> = match self {
            Self::Azure { region, key } => Arc::new(AzureTts::new(region, key.clone(), work_dir)?),
            Self::Translate { endpoint: Some(endpoint) } => {
                Arc::new(TranslateTts::with_endpoint(endpoint.as_str(), work_dir)?)
            }
            Self::Translate { endpoint: None } => Arc::new(TranslateTts::new(work_dir)?),
        };
        Ok(synthesizer)
    }
}

/// Sidecar configuration
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Supervise the local server
    pub enabled: bool,

    /// Server base URL
    pub url: String,

    pub readiness: ReadinessPolicy,
}

impl Config {
    /// Load configuration from the environment and a config file
    ///
    /// `path` overrides the standard config file location.
    ///
    /// # Errors
    ///
    /// Returns error if the config file is invalid, a value cannot be
    /// parsed, or a required credential is missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on invalid values or missing credentials
    pub fn from_sources(
        fc: TalkbackConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let record_duration = parse_env::<f64>(&env, "TALKBACK_RECORD_SECONDS")?
            .or(fc.recording.duration_secs)
            .map_or(Ok(DEFAULT_RECORD_DURATION), |s| secs("recording duration", s))?;

        let recording = RecordingConfig {
            work_dir: env("TALKBACK_WORK_DIR")
                .or(fc.recording.work_dir)
                .map_or_else(|| PathBuf::from("."), PathBuf::from),
        };

        let transcription = TranscriptionConfig {
            url: env("TALKBACK_STT_URL")
                .or(fc.transcription.url)
                .unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
            model: env("TALKBACK_STT_MODEL")
                .or(fc.transcription.model)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            language: env("TALKBACK_STT_LANGUAGE").or(fc.transcription.language),
            api_key: env("TALKBACK_STT_API_KEY")
                .or(fc.transcription.api_key)
                .map(SecretString::from),
        };

        let generation = resolve_generation(fc.generation, &env)?;

        let synthesis = resolve_synthesis(fc.synthesis, &env)?;

        let readiness_default = ReadinessPolicy::default();
        let sidecar = SidecarConfig {
            enabled: parse_env::<bool>(&env, "TALKBACK_SIDECAR")?
                .or(fc.sidecar.enabled)
                .unwrap_or_else(|| generation.provider.is_local()),
            url: env("TALKBACK_OLLAMA_URL")
                .or(fc.sidecar.url)
                .unwrap_or_else(|| match &generation.provider {
                    Provider::Ollama { base_url, .. } => base_url.clone(),
                    Provider::Gemini { .. } => DEFAULT_BASE_URL.to_string(),
                }),
            readiness: ReadinessPolicy {
                polls: fc.sidecar.polls.unwrap_or(readiness_default.polls),
                interval: fc
                    .sidecar
                    .interval_secs
                    .map_or(Ok(readiness_default.interval), |s| secs("sidecar interval", s))?,
                settle: fc
                    .sidecar
                    .settle_secs
                    .map_or(Ok(readiness_default.settle), |s| secs("sidecar settle", s))?,
            },
        };

        let turn = TurnSettings {
            record_duration,
            empty_transcript: env("TALKBACK_EMPTY_TRANSCRIPT")
                .or(fc.turn.empty_transcript)
                .map(|v| v.parse::<EmptyTranscriptPolicy>().map_err(Error::Config))
                .transpose()?
                .unwrap_or_default(),
        };

        Ok(Self {
            recording,
            transcription,
            generation,
            synthesis,
            sidecar,
            turn,
        })
    }

    /// Whether the local inference server should be supervised
    ///
    /// Only a local provider uses the sidecar.
    #[must_use]
    pub const fn supervises_sidecar(&self) -> bool {
        self.sidecar.enabled && self.generation.provider.is_local()
    }
}

fn resolve_generation(
    fc: file::GenerationFileConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<GenerationConfig> {
    let provider_name = env("TALKBACK_PROVIDER")
        .or(fc.provider)
        .unwrap_or_else(|| "gemini".to_string());

    let provider = match provider_name.to_ascii_lowercase().as_str() {
        "gemini" => {
            let api_key = env("GEMINI_API_KEY").or(fc.gemini_api_key).ok_or_else(|| {
                Error::Config("GEMINI_API_KEY is required for the gemini provider".to_string())
            })?;
            let model = env("TALKBACK_GEMINI_MODEL")
                .or(fc.gemini_model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
            Provider::Gemini {
                url: format!("{GEMINI_API_BASE}/{model}:generateContent"),
                api_key: SecretString::from(api_key),
            }
        }
        "ollama" => Provider::Ollama {
            base_url: env("TALKBACK_OLLAMA_URL")
                .or(fc.ollama_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: env("TALKBACK_OLLAMA_MODEL")
                .or(fc.ollama_model)
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
        },
        other => return Err(Error::Config(format!("unknown generation provider: {other}"))),
    };

    let defaults = RetryPolicy::default();
    let backoff = parse_env::<f64>(env, "TALKBACK_RETRY_BACKOFF_SECS")?
        .or(fc.backoff_secs)
        .map_or(Ok(defaults.backoff), |s| secs("retry backoff", s))?;

    let strategy = match fc.backoff.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("fixed") => Backoff::Fixed,
        Some("exponential") => Backoff::Exponential {
            max: fc
                .max_backoff_secs
                .map_or(Ok(Duration::from_secs(30)), |s| secs("max backoff", s))?,
        },
        Some(other) => return Err(Error::Config(format!("unknown backoff strategy: {other}"))),
    };

    let max_attempts = parse_env::<u32>(env, "TALKBACK_MAX_ATTEMPTS")?
        .or(fc.max_attempts)
        .unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(Error::Config("max_attempts must be at least 1".to_string()));
    }

    let retry = RetryPolicy {
        max_attempts,
        backoff,
        strategy,
        timeout: parse_env::<f64>(env, "TALKBACK_REQUEST_TIMEOUT_SECS")?
            .or(fc.timeout_secs)
            .map_or(Ok(defaults.timeout), |s| secs("request timeout", s))?,
    };

    Ok(GenerationConfig {
        provider,
        retry,
        fallback_reply: fc
            .fallback_reply
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
    })
}

fn resolve_synthesis(
    fc: file::SynthesisFileConfig,
    env: &impl Fn(&str) -> Option<String>,
) -> Result<SynthesisBackend> {
    let key = env("AZURE_SPEECH_KEY").or(fc.azure_key);
    let backend = env("TALKBACK_TTS").or(fc.backend);

    let use_azure = match backend.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("azure") => true,
        Some("translate") => false,
        None => key.is_some(),
        Some(other) => return Err(Error::Config(format!("unknown synthesis backend: {other}"))),
    };

    if !use_azure {
        return Ok(SynthesisBackend::Translate {
            endpoint: env("TALKBACK_TRANSLATE_TTS_URL").or(fc.translate_url),
        });
    }

    let key = key.ok_or_else(|| {
        Error::Config("AZURE_SPEECH_KEY is required for the azure backend".to_string())
    })?;

    Ok(SynthesisBackend::Azure {
        region: env("AZURE_SPEECH_REGION")
            .or(fc.azure_region)
            .unwrap_or_else(|| DEFAULT_AZURE_REGION.to_string()),
        key: SecretString::from(key),
    })
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {v}")))
        })
        .transpose()
}

fn secs(what: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::Config(format!("invalid {what}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(toml: &str) -> TalkbackConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_with_gemini_key() {
        let config =
            Config::from_sources(TalkbackConfigFile::default(), env(&[("GEMINI_API_KEY", "g")]))
                .unwrap();

        assert_eq!(config.turn.record_duration, Duration::from_secs(5));
        assert_eq!(config.transcription.url, DEFAULT_STT_URL);
        assert_eq!(config.generation.retry, RetryPolicy::default());
        assert_eq!(config.generation.fallback_reply, FALLBACK_REPLY);
        assert_eq!(config.generation.provider.name(), "gemini");
        assert_eq!(config.synthesis.name(), "translate");
        assert!(!config.sidecar.enabled);
        assert_eq!(config.turn.empty_transcript, EmptyTranscriptPolicy::Skip);

        match &config.generation.provider {
            Provider::Gemini { url, api_key } => {
                assert!(url.ends_with("/gemini-2.0-flash:generateContent"));
                assert_eq!(api_key.expose_secret(), "g");
            }
            Provider::Ollama { .. } => panic!("expected gemini"),
        }
    }

    #[test]
    fn missing_gemini_key_is_config_error() {
        let result = Config::from_sources(TalkbackConfigFile::default(), env(&[]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn ollama_enables_sidecar_without_key() {
        let config = Config::from_sources(
            parse("[generation]\nprovider = \"ollama\"\nollama_model = \"mistral\""),
            env(&[]),
        )
        .unwrap();

        assert!(config.generation.provider.is_local());
        assert!(config.sidecar.enabled);
        assert_eq!(config.sidecar.url, DEFAULT_BASE_URL);
        assert_eq!(config.sidecar.readiness, ReadinessPolicy::default());
        assert!(config.supervises_sidecar());
    }

    #[test]
    fn enabled_sidecar_ignored_for_remote_provider() {
        let config = Config::from_sources(
            parse("[sidecar]\nenabled = true"),
            env(&[("GEMINI_API_KEY", "g")]),
        )
        .unwrap();

        assert!(config.sidecar.enabled);
        assert!(!config.supervises_sidecar());
    }

    #[test]
    fn env_overrides_file() {
        let config = Config::from_sources(
            parse(
                r#"
                [recording]
                duration_secs = 3

                [generation]
                provider = "ollama"
                max_attempts = 2

                [turn]
                empty_transcript = "skip"
                "#,
            ),
            env(&[
                ("TALKBACK_RECORD_SECONDS", "8"),
                ("TALKBACK_MAX_ATTEMPTS", "5"),
                ("TALKBACK_EMPTY_TRANSCRIPT", "forward"),
                ("TALKBACK_SIDECAR", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.turn.record_duration, Duration::from_secs(8));
        assert_eq!(config.generation.retry.max_attempts, 5);
        assert_eq!(config.turn.empty_transcript, EmptyTranscriptPolicy::Forward);
        assert!(!config.sidecar.enabled);
    }

    #[test]
    fn azure_selected_by_key() {
        let config = Config::from_sources(
            TalkbackConfigFile::default(),
            env(&[("GEMINI_API_KEY", "g"), ("AZURE_SPEECH_KEY", "a")]),
        )
        .unwrap();

        match config.synthesis {
            SynthesisBackend::Azure { region, key } => {
                assert_eq!(region, DEFAULT_AZURE_REGION);
                assert_eq!(key.expose_secret(), "a");
            }
            SynthesisBackend::Translate { .. } => panic!("expected azure"),
        }
    }

    #[test]
    fn azure_without_key_is_config_error() {
        let result = Config::from_sources(
            parse("[synthesis]\nbackend = \"azure\""),
            env(&[("GEMINI_API_KEY", "g")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn exponential_backoff_from_file() {
        let config = Config::from_sources(
            parse(
                "[generation]\nbackoff = \"exponential\"\nbackoff_secs = 1\nmax_backoff_secs = 4",
            ),
            env(&[("GEMINI_API_KEY", "g")]),
        )
        .unwrap();

        assert_eq!(
            config.generation.retry.strategy,
            Backoff::Exponential {
                max: Duration::from_secs(4)
            }
        );
        assert_eq!(config.generation.retry.backoff, Duration::from_secs(1));
    }

    #[test]
    fn invalid_values_rejected() {
        let key = ("GEMINI_API_KEY", "g");
        for pairs in [
            vec![key, ("TALKBACK_MAX_ATTEMPTS", "many")],
            vec![key, ("TALKBACK_MAX_ATTEMPTS", "0")],
            vec![key, ("TALKBACK_RECORD_SECONDS", "-1")],
            vec![key, ("TALKBACK_PROVIDER", "openai")],
            vec![key, ("TALKBACK_TTS", "espeak")],
            vec![key, ("TALKBACK_EMPTY_TRANSCRIPT", "maybe")],
        ] {
            let result = Config::from_sources(TalkbackConfigFile::default(), env(&pairs));
            assert!(matches!(result, Err(Error::Config(_))), "{pairs:?}");
        }
    }

    #[test]
    fn backend_builds_synthesizer() {
        let dir = tempfile::tempdir().unwrap();
        let azure = SynthesisBackend::Azure {
            region: "westeurope".to_string(),
            key: SecretString::from("k".to_string()),
        };
        let translate = SynthesisBackend::Translate { endpoint: None };

        assert_eq!(azure.build(dir.path()).unwrap().name(), "azure");
        assert_eq!(translate.build(dir.path()).unwrap().name(), "translate");
    }

    #[test]
    fn debug_hides_secrets() {
        let config = Config::from_sources(
            TalkbackConfigFile::default(),
            env(&[
                ("GEMINI_API_KEY", "gemini-secret"),
                ("AZURE_SPEECH_KEY", "azure-secret"),
                ("TALKBACK_STT_API_KEY", "stt-secret"),
            ]),
        )
        .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("gemini-secret"));
        assert!(!debug.contains("azure-secret"));
        assert!(!debug.contains("stt-secret"));
    }
}
