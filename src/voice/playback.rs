//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::tts::{AudioFormat, SynthesisArtifact};
use crate::{Error, Result};

/// Interval between completion checks while audio is playing
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Slack allowed past the nominal audio length before giving up
const DRAIN_SLACK: Duration = Duration::from_millis(500);

/// Mono PCM ready for an output device
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Frames per second
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Nominal playing time
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let millis = (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate);
        Duration::from_millis(millis)
    }
}

/// Output device that plays decoded audio to completion
pub trait AudioSink: Send + Sync {
    /// Play `audio`, blocking the calling thread until it has finished
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened or fails mid-stream
    fn play_blocking(&self, audio: &DecodedAudio) -> Result<()>;
}

/// Plays audio on the default output device
#[derive(Debug, Clone, Copy)]
pub struct CpalSink {
    poll_interval: Duration,
}

impl CpalSink {
    /// Create a sink after checking an output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            poll_interval: POLL_INTERVAL,
        })
    }
}

impl AudioSink for CpalSink {
    fn play_blocking(&self, audio: &DecodedAudio) -> Result<()> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device".to_string()))?;

        let config = output_config(&device, audio.sample_rate)?;
        let channels = usize::from(config.channels.max(1));

        let samples: Arc<[f32]> = Arc::from(audio.samples.as_slice());
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = if let Some(&s) = samples.get(pos) {
                                position.store(pos + 1, Ordering::Relaxed);
                                s
                            } else {
                                finished.store(true, Ordering::Release);
                                0.0
                            };

                            for out in frame.iter_mut() {
                                *out = sample;
                            }
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Device(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        let start = Instant::now();
        let timeout = audio.duration() + DRAIN_SLACK;

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!(?timeout, "playback did not drain in time");
                break;
            }
            std::thread::sleep(self.poll_interval);
        }

        // Let the device flush its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }
}

/// Pick an output configuration at `sample_rate`, preferring mono
fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| {
            Error::Device(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(supported.with_sample_rate(SampleRate(sample_rate)).config())
}

/// Plays synthesis artifacts and removes them afterwards
#[derive(Clone)]
pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController").finish_non_exhaustive()
    }
}

impl PlaybackController {
    /// Create a controller around an output sink
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }

    /// Play an artifact to completion, then delete it
    ///
    /// The artifact is deleted whether decoding or playback succeeded,
    /// failed or panicked.
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play(&self, artifact: SynthesisArtifact) -> Result<()> {
        let path = artifact.path().to_path_buf();
        let format = artifact.format();
        let sink = Arc::clone(&self.sink);

        let outcome = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)?;
            let audio = decode(format, &bytes)?;
            tracing::debug!(
                duration = ?audio.duration(),
                sample_rate = audio.sample_rate,
                "playing artifact"
            );
            sink.play_blocking(&audio)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))
        .and_then(|result| result);

        if let Err(e) = artifact.discard() {
            tracing::warn!(error = %e, "failed to remove speech artifact");
        }

        outcome
    }
}

/// Decode an artifact's bytes according to its container format
///
/// # Errors
///
/// Returns error if the data does not match the format
pub fn decode(format: AudioFormat, data: &[u8]) -> Result<DecodedAudio> {
    match format {
        AudioFormat::Mp3 => decode_mp3(data),
        AudioFormat::Wav => decode_wav(data),
    }
}

/// Decode WAV bytes (16-bit integer or 32-bit float) to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not a supported WAV stream
pub fn decode_wav(wav_data: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(wav_data))
        .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<Vec<f32>, hound::Error>>(),
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>(),
        (format, bits) => {
            return Err(Error::Playback(format!(
                "unsupported WAV layout: {bits}-bit {format:?}"
            )));
        }
    }
    .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    if samples.is_empty() {
        return Err(Error::Playback("no audio frames in artifact".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                }

                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Playback("no audio frames in artifact".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
