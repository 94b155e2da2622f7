//! Audio capture from microphone
//!
//! A recording is a fixed number of 1024-frame chunks at 16 kHz mono,
//! written to a uniquely named WAV file that lives as long as its
//! [`AudioClip`].

use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Frames per capture chunk
pub const CHUNK_SIZE: usize = 1024;

/// Extra time a capture may take beyond its nominal duration
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

/// How often the capture thread checks the buffer
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// PCM layout of a recorded clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl ClipFormat {
    /// 16 kHz, mono, 16-bit signed PCM
    pub const SPEECH: Self = Self {
        sample_rate: SAMPLE_RATE,
        channels: 1,
        bits_per_sample: 16,
    };

    const fn wav_spec(self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

impl Default for ClipFormat {
    fn default() -> Self {
        Self::SPEECH
    }
}

/// A recorded utterance and the WAV file backing it
///
/// The file is removed when the clip is dropped or discarded.
#[derive(Debug)]
pub struct AudioClip {
    samples: Vec<i16>,
    format: ClipFormat,
    file: NamedTempFile,
}

impl AudioClip {
    /// Serialize samples to a new WAV file in `dir`
    ///
    /// The file name is `recording_<timestamp>_<random>.wav`, so a clip left
    /// behind by an earlier turn or an unclean shutdown is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or encoded
    pub fn write(samples: Vec<i16>, format: ClipFormat, dir: &Path) -> Result<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut file = tempfile::Builder::new()
            .prefix(&format!("recording_{stamp}_"))
            .suffix(".wav")
            .tempfile_in(dir)?;

        {
            let mut writer =
                hound::WavWriter::new(BufWriter::new(file.as_file_mut()), format.wav_spec())?;
            for &sample in &samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        tracing::debug!(
            path = %file.path().display(),
            samples = samples.len(),
            "clip written"
        );

        Ok(Self {
            samples,
            format,
            file,
        })
    }

    /// Location of the WAV file
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Raw PCM samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// PCM layout
    #[must_use]
    pub const fn format(&self) -> ClipFormat {
        self.format
    }

    /// Length of the recording
    #[must_use]
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.format.channels.max(1));
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(frames as f64 / f64::from(self.format.sample_rate))
    }

    /// Delete the backing file now
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be removed
    pub fn discard(self) -> Result<()> {
        let path = self.file.path().to_path_buf();
        self.file.close()?;
        tracing::debug!(path = %path.display(), "clip removed");
        Ok(())
    }
}

/// Source of fixed-duration recordings
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Record for `duration` and return the clip
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the input device cannot be used
    async fn record(&self, duration: Duration) -> Result<AudioClip>;
}

/// Number of chunks needed to cover `duration`, rounded up
#[must_use]
pub fn chunk_count(duration: Duration, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    // frames = nanos * rate / 1e9, kept in integers so exact multiples stay exact
    let scaled_frames = duration.as_nanos() * u128::from(SAMPLE_RATE);
    let per_chunk = 1_000_000_000 * chunk_size as u128;
    usize::try_from(scaled_frames.div_ceil(per_chunk)).unwrap_or(usize::MAX)
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[must_use]
pub fn sample_to_i16(sample: f32) -> i16 {
    #[allow(clippy::cast_possible_truncation)]
    let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
    value
}

/// Records from the default input device
#[derive(Debug, Clone)]
pub struct AudioRecorder {
    output_dir: PathBuf,
}

impl AudioRecorder {
    /// Create a recorder that writes clips into `output_dir`
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl Recorder for AudioRecorder {
    async fn record(&self, duration: Duration) -> Result<AudioClip> {
        let target = chunk_count(duration, CHUNK_SIZE) * CHUNK_SIZE;
        let deadline = duration + CAPTURE_GRACE;
        let dir = self.output_dir.clone();

        // cpal streams are not Send; the stream lives and dies on this thread
        tokio::task::spawn_blocking(move || {
            let samples = capture_blocking(target, deadline)?;
            AudioClip::write(samples, ClipFormat::SPEECH, &dir)
        })
        .await
        .map_err(|e| Error::Device(format!("capture task failed: {e}")))?
    }
}

/// Capture `target` mono samples from the default input device
fn capture_blocking(target: usize, deadline: Duration) -> Result<Vec<i16>> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Device("no input device available".to_string()))?;
    let config = input_config(&device)?;
    let channels = usize::from(config.channels.max(1));

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = SAMPLE_RATE,
        channels,
        target,
        "audio capture initialized"
    );

    let buffer = Arc::new(Mutex::new(Vec::with_capacity(target)));
    let writer = Arc::clone(&buffer);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let Ok(mut buf) = writer.lock() else {
                    return;
                };
                for frame in data.chunks(channels) {
                    if buf.len() >= target {
                        break;
                    }
                    #[allow(clippy::cast_precision_loss)]
                    let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                    buf.push(sample_to_i16(mono));
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Device(e.to_string()))?;

    stream.play().map_err(|e| Error::Device(e.to_string()))?;
    println!("* recording");

    let start = Instant::now();
    loop {
        let captured = buffer.lock().map(|b| b.len()).unwrap_or_default();
        if captured >= target {
            break;
        }
        if start.elapsed() > deadline {
            return Err(Error::Device(format!(
                "capture stalled after {captured} of {target} samples"
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);
    println!("* done recording");

    let mut samples = buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default();
    samples.truncate(target);
    Ok(samples)
}

/// Pick a 16 kHz input configuration, preferring mono
fn input_config(device: &Device) -> Result<StreamConfig> {
    let supports = |channels: u16| {
        device.supported_input_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

    Ok(supported.with_sample_rate(SampleRate(SAMPLE_RATE)).config())
}
