//! Generation providers and their wire formats

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A JSON POST ready to be sent by a [`super::Transport`]
#[derive(Clone)]
pub struct OutboundRequest {
    /// Target URL
    pub url: String,
    /// Extra headers (values may be credentials)
    pub headers: Vec<(&'static str, String)>,
    /// JSON body
    pub body: serde_json::Value,
}

impl std::fmt::Debug for OutboundRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("OutboundRequest")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("body", &self.body)
            .finish()
    }
}

/// Where replies are generated
#[derive(Clone)]
pub enum Provider {
    /// Google Gemini `generateContent` endpoint
    Gemini {
        /// Full model URL ending in `:generateContent`
        url: String,
        /// API key sent as `x-goog-api-key`
        api_key: SecretString,
    },
    /// Local Ollama server
    Ollama {
        /// Server base URL (e.g. `http://localhost:11434`)
        base_url: String,
        /// Model name (e.g. "llama3.2")
        model: String,
    },
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini { url, .. } => f
                .debug_struct("Gemini")
                .field("url", url)
                .finish_non_exhaustive(),
            Self::Ollama { base_url, model } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
        }
    }
}

impl Provider {
    /// Provider name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gemini { .. } => "gemini",
            Self::Ollama { .. } => "ollama",
        }
    }

    /// Whether replies come from a locally supervised server
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Ollama { .. })
    }

    /// Build the request carrying `text`
    #[must_use]
    pub fn build_request(&self, text: &str) -> OutboundRequest {
        match self {
            Self::Gemini { url, api_key } => OutboundRequest {
                url: url.clone(),
                headers: vec![("x-goog-api-key", api_key.expose_secret().to_string())],
                body: serde_json::json!(GeminiRequest {
                    contents: vec![GeminiContent {
                        parts: vec![GeminiPart {
                            text: text.to_string(),
                        }],
                    }],
                }),
            },
            Self::Ollama { base_url, model } => OutboundRequest {
                url: format!("{}/api/generate", base_url.trim_end_matches('/')),
                headers: Vec::new(),
                body: serde_json::json!(OllamaRequest {
                    model,
                    prompt: text,
                    stream: false,
                }),
            },
        }
    }

    /// Pull the reply text out of a response body
    ///
    /// Returns `None` when the body does not have the expected shape.
    #[must_use]
    pub fn extract_reply(&self, body: &str) -> Option<String> {
        match self {
            Self::Gemini { .. } => {
                let response: GeminiResponse = serde_json::from_str(body).ok()?;
                response
                    .candidates
                    .into_iter()
                    .next()?
                    .content?
                    .parts
                    .into_iter()
                    .next()
                    .map(|part| part.text)
            }
            Self::Ollama { .. } => {
                let response: OllamaResponse = serde_json::from_str(body).ok()?;
                Some(response.response)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}
