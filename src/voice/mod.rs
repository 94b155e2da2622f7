//! Voice processing module
//!
//! Handles fixed-length audio capture and playback of synthesized speech.
//! Transcription and synthesis live in `transcribe` and `tts`.

mod capture;
mod playback;

pub use capture::{
    AudioClip, AudioRecorder, CHUNK_SIZE, ClipFormat, Recorder, SAMPLE_RATE, chunk_count,
    sample_to_i16,
};
pub use playback::{
    AudioSink, CpalSink, DecodedAudio, PlaybackController, decode, decode_mp3, decode_wav,
};
