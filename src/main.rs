use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use talkback::voice::{AudioSink, CpalSink, DecodedAudio};
use talkback::{
    AudioRecorder, Config, LanguageRouter, Pipeline, PlaybackController, Recorder,
    ResponseClient, SidecarManager, StdinTrigger, TurnOrchestrator,
    WhisperHttpTranscriber,
};

/// talkback - push-to-talk voice assistant
#[derive(Parser)]
#[command(name = "talkback", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/talkback/config.toml)
    #[arg(short, long, env = "TALKBACK_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to record per turn
    #[arg(short, long, global = true)]
    duration: Option<f64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice loop (default)
    Run,
    /// Test microphone input
    TestMic,
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Restart the local inference server and wait until it is ready
    Sidecar,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info",
        1 => "info,talkback=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let duration = cli
        .duration
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --duration: {e}"))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_loop(cli.config.as_deref(), duration).await,
        Command::TestMic => test_mic(duration.unwrap_or(Duration::from_secs(5))).await,
        Command::TestSpeaker => test_speaker().await,
        Command::TestTts { text } => test_tts(cli.config.as_deref(), &text).await,
        Command::Sidecar => cmd_sidecar(cli.config.as_deref()).await,
    }
}

/// Build every collaborator and run turns until the user quits
async fn run_loop(config_path: Option<&Path>, duration: Option<Duration>) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(duration) = duration {
        config.turn.record_duration = duration;
    }
    tracing::debug!(?config, "loaded configuration");

    std::fs::create_dir_all(&config.recording.work_dir)?;

    println!("Loading speech recognition model...");
    let transcriber = WhisperHttpTranscriber::connect(
        config.transcription.url.as_str(),
        config.transcription.model.as_str(),
        config.transcription.api_key.clone(),
    )
    .await?
    .with_language(config.transcription.language.clone());

    let sidecar = if config.supervises_sidecar() {
        let manager = SidecarManager::new(&config.sidecar.url, config.sidecar.readiness)?;
        if !manager.is_healthy().await {
            println!("Starting local inference server...");
            if !manager.ensure_running().await {
                tracing::warn!(url = %config.sidecar.url, "inference server not ready, replies will fall back");
            }
        }
        Some(manager)
    } else {
        None
    };

    let responder = ResponseClient::new(
        config.generation.provider.clone(),
        config.generation.retry.clone(),
    )?
    .with_fallback(config.generation.fallback_reply.clone());

    let synthesizer = config.synthesis.build(&config.recording.work_dir)?;
    let playback = PlaybackController::new(Arc::new(CpalSink::new()?));

    tracing::info!(
        provider = responder.provider().name(),
        synthesis = config.synthesis.name(),
        duration = ?config.turn.record_duration,
        sidecar = sidecar.is_some(),
        "talkback ready"
    );

    let orchestrator = TurnOrchestrator::new(
        Pipeline {
            recorder: Arc::new(AudioRecorder::new(&config.recording.work_dir)),
            transcriber: Arc::new(transcriber),
            responder,
            router: LanguageRouter::default(),
            synthesizer,
            playback,
            sidecar,
        },
        config.turn,
    );

    let mut trigger = StdinTrigger::new();
    orchestrator.run(&mut trigger).await;

    println!("Goodbye!");
    Ok(())
}

/// Test microphone input
async fn test_mic(duration: Duration) -> anyhow::Result<()> {
    println!("Testing microphone for {:.1} seconds...", duration.as_secs_f64());
    println!("Speak into your microphone!\n");

    let dir = tempfile::tempdir()?;
    let recorder = AudioRecorder::new(dir.path());
    let clip = recorder.record(duration).await?;

    let format = clip.format();
    println!("Sample rate: {} Hz", format.sample_rate);
    println!("---");

    let per_second = usize::try_from(format.sample_rate).unwrap_or(usize::MAX).max(1);
    for (i, second) in clip.samples().chunks(per_second).enumerate() {
        let energy = calculate_rms(second);
        let peak = second
            .iter()
            .map(|s| f32::from(*s).abs() / f32::from(i16::MAX))
            .fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    clip.discard()?;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy of 16-bit samples, normalized to 0..1
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|s| {
            let v = f32::from(*s) / f32::from(i16::MAX);
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    // 2 seconds of 440Hz sine wave at 24kHz
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let num_samples = sample_rate as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    let audio = DecodedAudio {
        samples,
        sample_rate,
    };
    tokio::task::spawn_blocking(move || sink.play_blocking(&audio)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test the configured synthesis backend
async fn test_tts(config_path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let dir = tempfile::tempdir()?;
    let synthesizer = config.synthesis.build(dir.path())?;

    let voice = LanguageRouter::default().detect_voice(text);
    println!(
        "Backend: {} | language: {} | voice: {}",
        synthesizer.name(),
        voice.tag,
        voice.neural_voice
    );

    println!("Synthesizing speech...");
    let artifact = synthesizer.synthesize(text, &voice).await?;
    let size = std::fs::metadata(artifact.path())?.len();
    println!("Got {size} bytes of audio data");

    println!("Playing audio...");
    let playback = PlaybackController::new(Arc::new(CpalSink::new()?));
    playback.play(artifact).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Restart the local inference server
async fn cmd_sidecar(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let manager = SidecarManager::new(&config.sidecar.url, config.sidecar.readiness)?;

    if manager.is_healthy().await {
        println!("Inference server at {} is already running", config.sidecar.url);
        return Ok(());
    }

    println!("Starting inference server...");
    if manager.ensure_running().await {
        println!("Inference server ready at {}", config.sidecar.url);
        Ok(())
    } else {
        anyhow::bail!("inference server at {} did not become ready", config.sidecar.url)
    }
}
