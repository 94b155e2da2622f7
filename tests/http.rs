//! HTTP client integration tests
//!
//! Exercises the reqwest-backed clients against in-process axum servers

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use secrecy::SecretString;
use talkback::generate::{Backoff, FALLBACK_REPLY};
use talkback::sidecar::{HealthProbe, HttpHealthProbe};
use talkback::transcribe::Transcriber;
use talkback::tts::{AudioFormat, AzureTts, TranslateTts};
use talkback::voice::ClipFormat;
use talkback::{AudioClip, Error, LanguageTag, Provider, ResponseClient, RetryPolicy, Synthesizer, WhisperHttpTranscriber};

mod common;

/// Serve `router` on an ephemeral port and return its base URL
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on
async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_millis(10),
        strategy: Backoff::Fixed,
        timeout: Duration::from_secs(5),
    }
}

fn gemini_at(base: &str, key: &str) -> Provider {
    Provider::Gemini {
        url: format!("{base}/v1beta/models/gemini-2.0-flash:generateContent"),
        api_key: SecretString::from(key.to_string()),
    }
}

async fn flaky_gemini(State(calls): State<Arc<AtomicU32>>, headers: HeaderMap) -> (StatusCode, String) {
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
        return (StatusCode::UNAUTHORIZED, "missing key".to_string());
    }

    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded".to_string());
    }

    (StatusCode::OK, common::gemini_body("**Hello!** I'm fine."))
}

#[tokio::test]
async fn test_gemini_retries_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route("/v1beta/models/{model}", post(flaky_gemini))
        .with_state(calls.clone());
    let base = serve(router).await;

    let client = ResponseClient::new(gemini_at(&base, "test-key"), quick_policy()).unwrap();
    let result = client.generate("Hello, how are you?").await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.text, "Hello! I'm fine.");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_gemini_rejected_key_falls_back() {
    let calls = Arc::new(AtomicU32::new(0));
    let router = Router::new()
        .route("/v1beta/models/{model}", post(flaky_gemini))
        .with_state(calls.clone());
    let base = serve(router).await;

    let client = ResponseClient::new(gemini_at(&base, "wrong"), quick_policy()).unwrap();
    let result = client.generate("hi").await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.text, FALLBACK_REPLY);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let router = Router::new().route(
        "/v1beta/models/{model}",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            common::gemini_body("too late")
        }),
    );
    let base = serve(router).await;

    let policy = RetryPolicy {
        max_attempts: 2,
        timeout: Duration::from_millis(200),
        ..quick_policy()
    };
    let client = ResponseClient::new(gemini_at(&base, "test-key"), policy).unwrap();
    let result = client.generate("hi").await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert!(result.latency < Duration::from_secs(5));
}

#[tokio::test]
async fn test_unreachable_endpoint_falls_back() {
    let base = dead_url().await;
    let client = ResponseClient::new(gemini_at(&base, "test-key"), quick_policy()).unwrap();

    let result = client.generate("hi").await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn test_ollama_request_shape() {
    let router = Router::new().route(
        "/api/generate",
        post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
            assert_eq!(body["model"], "llama3.2");
            assert_eq!(body["prompt"], "Hello, how are you?");
            assert_eq!(body["stream"], false);
            axum::Json(serde_json::json!({"model": "llama3.2", "response": "> Fine, thanks.", "done": true}))
        }),
    );
    let base = serve(router).await;

    let provider = Provider::Ollama {
        base_url: base,
        model: "llama3.2".to_string(),
    };
    let client = ResponseClient::new(provider, quick_policy()).unwrap();
    let result = client.generate("Hello, how are you?").await;

    assert!(result.success);
    assert_eq!(result.text, " Fine, thanks.");
}

async fn transcriptions(headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let body = String::from_utf8_lossy(&body);
    let multipart = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !multipart || !body.contains("verbose_json") || !body.contains("RIFF") {
        return (StatusCode::BAD_REQUEST, "bad upload".to_string());
    }

    let response = serde_json::json!({
        "text": " Hello, how are you?",
        "segments": [
            {"id": 0, "start": 0.0, "end": 0.9, "text": " Hello,"},
            {"id": 1, "start": 0.9, "end": 1.8, "text": " how are you?"}
        ]
    });
    (StatusCode::OK, response.to_string())
}

#[tokio::test]
async fn test_whisper_transcription() {
    let router = Router::new()
        .route("/v1/models", get(|| async { r#"{"data":[{"id":"base"}]}"# }))
        .route("/v1/audio/transcriptions", post(transcriptions));
    let base = serve(router).await;

    let transcriber = WhisperHttpTranscriber::connect(format!("{base}/v1"), "base", None)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let clip = AudioClip::write(vec![0; 1600], ClipFormat::SPEECH, dir.path()).unwrap();
    let segments = transcriber.transcribe(&clip).await.unwrap();

    let transcript = talkback::Transcript::from_segments(&segments, Duration::ZERO);
    assert_eq!(transcript.text, "Hello, how are you?");
}

#[tokio::test]
async fn test_whisper_connect_fails_when_unreachable() {
    let base = dead_url().await;

    let result = WhisperHttpTranscriber::connect(base, "base", None).await;

    assert!(matches!(result, Err(Error::Transcription(_))));
}

async fn azure(headers: HeaderMap, body: String) -> (StatusCode, Vec<u8>) {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();

    if header("ocp-apim-subscription-key") != "speech-key" {
        return (StatusCode::UNAUTHORIZED, Vec::new());
    }
    assert_eq!(header("content-type"), "application/ssml+xml");
    assert_eq!(header("x-microsoft-outputformat"), "audio-24khz-48kbitrate-mono-mp3");
    assert!(body.contains("<voice name='fr-FR-HenriNeural'>"));
    assert!(body.contains("Tom &amp; Jerry"));

    (StatusCode::OK, b"ID3-azure-audio".to_vec())
}

#[tokio::test]
async fn test_azure_synthesis() {
    let base = serve(Router::new().route("/cognitiveservices/v1", post(azure))).await;
    let dir = tempfile::tempdir().unwrap();

    let tts = AzureTts::with_endpoint(
        format!("{base}/cognitiveservices/v1"),
        SecretString::from("speech-key".to_string()),
        dir.path(),
    )
    .unwrap();
    let artifact = tts
        .synthesize("Tom & Jerry", &LanguageTag::French.voice())
        .await
        .unwrap();

    assert_eq!(artifact.format(), AudioFormat::Mp3);
    assert_eq!(std::fs::read(artifact.path()).unwrap(), b"ID3-azure-audio");
    let name = artifact.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("speech_") && name.ends_with(".mp3"), "{name}");

    let path = artifact.path().to_path_buf();
    artifact.discard().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_azure_rejection_is_synthesis_error() {
    let base = serve(Router::new().route("/cognitiveservices/v1", post(azure))).await;
    let dir = tempfile::tempdir().unwrap();

    let tts = AzureTts::with_endpoint(
        format!("{base}/cognitiveservices/v1"),
        SecretString::from("wrong".to_string()),
        dir.path(),
    )
    .unwrap();
    let result = tts.synthesize("hello", &LanguageTag::English.voice()).await;

    assert!(matches!(result, Err(Error::Synthesis(_))));
    assert_eq!(common::files_in(dir.path()), 0);
}

#[tokio::test]
async fn test_translate_synthesis_concatenates_chunks() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<HashMap<String, String>>::new()));
    let router = Router::new()
        .route(
            "/translate_tts",
            get(
                |State(seen): State<Arc<std::sync::Mutex<Vec<HashMap<String, String>>>>>,
                 Query(params): Query<HashMap<String, String>>| async move {
                    let idx = params.get("idx").cloned().unwrap_or_default();
                    seen.lock().unwrap().push(params);
                    format!("[{idx}]")
                },
            ),
        )
        .with_state(seen.clone());
    let base = serve(router).await;
    let dir = tempfile::tempdir().unwrap();

    let tts = TranslateTts::with_endpoint(format!("{base}/translate_tts"), dir.path()).unwrap();
    let text = "palabra ".repeat(40);
    let artifact = tts
        .synthesize(&text, &LanguageTag::Spanish.voice())
        .await
        .unwrap();

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    for params in &requests {
        assert_eq!(params["client"], "tw-ob");
        assert_eq!(params["tl"], "es");
        assert_eq!(params["total"], "2");
        assert!(params["q"].chars().count() <= 200);
    }
    assert_eq!(std::fs::read(artifact.path()).unwrap(), b"[0][1]");
}

#[tokio::test]
async fn test_health_probe() {
    let base = serve(Router::new().route("/api/version", get(|| async { r#"{"version":"0.5.1"}"# }))).await;
    assert!(HttpHealthProbe::new(&base).unwrap().is_ready().await);

    let dead = dead_url().await;
    assert!(!HttpHealthProbe::new(&dead).unwrap().is_ready().await);
}
