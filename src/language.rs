//! Reply language detection and voice selection
//!
//! Detection never fails past this module: an empty, ambiguous or
//! unsupported reply resolves to [`LanguageTag::English`].

use thiserror::Error;

/// Why a language could not be identified
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectionError {
    /// Nothing to analyze
    #[error("no text to analyze")]
    Empty,

    /// The detector could not settle on a language
    #[error("language could not be determined")]
    Undetermined,

    /// Detector backend failure
    #[error("detector failure: {0}")]
    Backend(String),
}

/// Languages with a dedicated synthesis voice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LanguageTag {
    /// English (base language)
    #[default]
    English,
    /// French
    French,
    /// Spanish
    Spanish,
    /// German
    German,
    /// Arabic
    Arabic,
    /// Italian
    Italian,
    /// Portuguese
    Portuguese,
}

impl LanguageTag {
    /// Every supported tag
    pub const ALL: [Self; 7] = [
        Self::English,
        Self::French,
        Self::Spanish,
        Self::German,
        Self::Arabic,
        Self::Italian,
        Self::Portuguese,
    ];

    /// Parse an ISO 639-1 code (case-insensitive, region suffix ignored)
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        match primary.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::English),
            "fr" => Some(Self::French),
            "es" => Some(Self::Spanish),
            "de" => Some(Self::German),
            "ar" => Some(Self::Arabic),
            "it" => Some(Self::Italian),
            "pt" => Some(Self::Portuguese),
            _ => None,
        }
    }

    /// ISO 639-1 code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::French => "fr",
            Self::Spanish => "es",
            Self::German => "de",
            Self::Arabic => "ar",
            Self::Italian => "it",
            Self::Portuguese => "pt",
        }
    }

    /// Voice used for this language
    #[must_use]
    pub const fn voice(self) -> VoiceSelection {
        let neural_voice = match self {
            Self::English => "en-US-ChristopherNeural",
            Self::French => "fr-FR-HenriNeural",
            Self::Spanish => "es-ES-AlvaroNeural",
            Self::German => "de-DE-ConradNeural",
            Self::Arabic => "ar-SA-HamedNeural",
            Self::Italian => "it-IT-DiegoNeural",
            Self::Portuguese => "pt-BR-AntonioNeural",
        };

        VoiceSelection {
            tag: self,
            neural_voice,
        }
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Voice chosen for a reply
///
/// Carries an identifier for each synthesis backend; each backend reads
/// the one it understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSelection {
    /// Language the voice speaks
    pub tag: LanguageTag,
    /// Neural voice name (e.g. "en-US-ChristopherNeural")
    pub neural_voice: &'static str,
}

impl VoiceSelection {
    /// Language code for code-driven backends
    #[must_use]
    pub const fn language_code(&self) -> &'static str {
        self.tag.code()
    }

    /// BCP 47 locale taken from the neural voice name (e.g. "en-US")
    #[must_use]
    pub fn locale(&self) -> &'static str {
        let voice = self.neural_voice;
        voice
            .match_indices('-')
            .nth(1)
            .map_or(voice, |(idx, _)| &voice[..idx])
    }
}

impl Default for VoiceSelection {
    fn default() -> Self {
        LanguageTag::default().voice()
    }
}

/// Identifies the language of a piece of text
pub trait LanguageDetector: Send + Sync {
    /// Return the ISO 639-1 code of the dominant language
    ///
    /// # Errors
    ///
    /// Returns a `DetectionError` when the language cannot be identified
    fn detect(&self, text: &str) -> Result<String, DetectionError>;
}

/// Lowest `whatlang` confidence accepted as a detection
///
/// Short replies ("Sure.") score near zero for whichever language wins.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Trigram-based detector backed by `whatlang`
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Result<String, DetectionError> {
        if text.trim().is_empty() {
            return Err(DetectionError::Empty);
        }

        let info = whatlang::detect(text).ok_or(DetectionError::Undetermined)?;
        tracing::trace!(
            lang = info.lang().code(),
            confidence = info.confidence(),
            "whatlang result"
        );

        if info.confidence() < MIN_CONFIDENCE {
            return Err(DetectionError::Undetermined);
        }

        let code = match info.lang() {
            whatlang::Lang::Eng => "en",
            whatlang::Lang::Fra => "fr",
            whatlang::Lang::Spa => "es",
            whatlang::Lang::Deu => "de",
            whatlang::Lang::Ara => "ar",
            whatlang::Lang::Ita => "it",
            whatlang::Lang::Por => "pt",
            // Unsupported languages keep their ISO 639-3 code
            other => other.code(),
        };

        Ok(code.to_string())
    }
}

/// Maps reply text to a synthesis voice
pub struct LanguageRouter {
    detector: Box<dyn LanguageDetector>,
}

impl std::fmt::Debug for LanguageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageRouter").finish_non_exhaustive()
    }
}

impl Default for LanguageRouter {
    fn default() -> Self {
        Self::new(Box::new(WhatlangDetector))
    }
}

impl LanguageRouter {
    /// Create a router around a detector
    #[must_use]
    pub fn new(detector: Box<dyn LanguageDetector>) -> Self {
        Self { detector }
    }

    /// Detect the language of `text`, defaulting to English
    #[must_use]
    pub fn detect_language(&self, text: &str) -> LanguageTag {
        match self.detector.detect(text) {
            Ok(code) => LanguageTag::from_code(&code).unwrap_or_else(|| {
                tracing::debug!(code, "no voice for detected language, using default");
                LanguageTag::default()
            }),
            Err(e) => {
                tracing::debug!(error = %e, "language detection failed, using default");
                LanguageTag::default()
            }
        }
    }

    /// Pick the voice for `text`
    #[must_use]
    pub fn detect_voice(&self, text: &str) -> VoiceSelection {
        self.detect_language(text).voice()
    }
}
