//! Audio ingestion and normalization.
//!
//! Sources hand the pipeline a fully assembled clip of raw PCM16 bytes:
//! - Local WAV files (`WavFileSource`)
//! - UDP relay streams from a phone or microcontroller (`UdpPcmSource`)
//! - Stub source (`stub://`, testing and bench runs)
//!
//! Framing of the transport is the source's concern. Decoding into a
//! `Waveform` always goes through `normalize_pcm16_at`, so a malformed clip
//! surfaces as a decode error in the cycle rather than inside a source.

pub mod file;
mod normalize;
pub mod udp;

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{PetCareError, Result};

pub use file::WavFileSource;
pub use normalize::{
    normalize_pcm16, normalize_pcm16_at, pcm16_bytes, Waveform, DEFAULT_SAMPLE_RATE, PCM16_SCALE,
};
pub use udp::UdpPcmSource;

/// One captured clip: little-endian PCM16 mono bytes plus their sample rate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, sample_rate: u32) -> Self {
        Self { bytes, sample_rate }
    }

    /// Decode into a normalized waveform.
    pub fn to_waveform(&self) -> Result<Waveform> {
        normalize_pcm16_at(&self.bytes, self.sample_rate)
    }
}

/// Anything that can produce the next audio clip for a decision cycle.
pub trait AudioSource: Send {
    fn name(&self) -> &'static str;

    /// Block until a full clip is available.
    fn next_clip(&mut self) -> Result<AudioClip>;
}

/// Scripted source for tests and bench runs.
///
/// Clips are served in order; once the script is exhausted the source keeps
/// producing silence of `silence_samples` length.
pub struct StubAudioSource {
    clips: VecDeque<AudioClip>,
    silence_samples: usize,
}

impl StubAudioSource {
    pub fn new(silence_samples: usize) -> Self {
        Self {
            clips: VecDeque::new(),
            silence_samples,
        }
    }

    pub fn with_clip(mut self, clip: AudioClip) -> Self {
        self.clips.push_back(clip);
        self
    }
}

impl AudioSource for StubAudioSource {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn next_clip(&mut self) -> Result<AudioClip> {
        if let Some(clip) = self.clips.pop_front() {
            return Ok(clip);
        }
        Ok(AudioClip::new(
            vec![0u8; self.silence_samples * 2],
            DEFAULT_SAMPLE_RATE,
        ))
    }
}

/// Build a source from a location string.
///
/// - `stub://<samples>` or `stub://` for silence
/// - `udp://<bind addr>` for a relay stream collected over `capture_window`
/// - anything else is a local WAV path
pub fn open_source(location: &str, capture_window: Duration) -> Result<Box<dyn AudioSource>> {
    let location = location.trim();
    if location.is_empty() {
        return Err(PetCareError::Config("audio source must not be empty".into()));
    }
    if let Some(rest) = location.strip_prefix("stub://") {
        let samples = if rest.is_empty() {
            DEFAULT_SAMPLE_RATE as usize
        } else {
            rest.parse::<usize>().map_err(|_| {
                PetCareError::Config(format!("stub audio source expects a sample count: {}", rest))
            })?
        };
        return Ok(Box::new(StubAudioSource::new(samples)));
    }
    if let Some(addr) = location.strip_prefix("udp://") {
        return Ok(Box::new(UdpPcmSource::bind(addr, capture_window)?));
    }
    if location.contains("://") {
        return Err(PetCareError::Config(format!(
            "unsupported audio source scheme: {}",
            location
        )));
    }
    Ok(Box::new(WavFileSource::new(location)))
}
