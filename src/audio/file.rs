//! Local WAV clip source.
//!
//! Re-reads the configured file on every cycle, the way the relay receiver
//! overwrites `received_audio.wav` in place. Only 16-bit integer PCM is
//! accepted; multi-channel files keep their first channel.

use std::path::{Path, PathBuf};

use super::{pcm16_bytes, AudioClip, AudioSource, DEFAULT_SAMPLE_RATE};
use crate::error::{PetCareError, Result};

pub struct WavFileSource {
    path: PathBuf,
}

impl WavFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for WavFileSource {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn next_clip(&mut self) -> Result<AudioClip> {
        read_wav_clip(&self.path)
    }
}

/// Read a WAV file into a mono PCM16 clip.
pub fn read_wav_clip(path: &Path) -> Result<AudioClip> {
    let mut reader = hound::WavReader::open(path).map_err(|e| {
        PetCareError::Decode(format!("failed to open WAV {}: {}", path.display(), e))
    })?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(PetCareError::Decode(format!(
            "{} is not 16-bit PCM ({} bits, {:?})",
            path.display(),
            spec.bits_per_sample,
            spec.sample_format
        )));
    }
    if spec.sample_rate != DEFAULT_SAMPLE_RATE {
        log::warn!(
            "{}: expected {} Hz sample rate, got {}",
            path.display(),
            DEFAULT_SAMPLE_RATE,
            spec.sample_rate
        );
    }

    let channels = spec.channels.max(1) as usize;
    let mut samples = Vec::new();
    for (i, sample) in reader.samples::<i16>().enumerate() {
        let sample = sample.map_err(|e| {
            PetCareError::Decode(format!("corrupt sample in {}: {}", path.display(), e))
        })?;
        if i % channels == 0 {
            samples.push(sample);
        }
    }
    log::debug!(
        "read {} samples from {} ({} channel(s))",
        samples.len(),
        path.display(),
        channels
    );
    Ok(AudioClip::new(pcm16_bytes(&samples), spec.sample_rate))
}
