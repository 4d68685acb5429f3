use crate::error::{PetCareError, Result};

/// Divisor mapping signed 16-bit samples onto [-1.0, 1.0).
pub const PCM16_SCALE: f32 = 32768.0;

/// Sample rate the sound models were trained on.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Normalized mono audio signal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode a little-endian PCM16 buffer at the default sample rate.
pub fn normalize_pcm16(bytes: &[u8]) -> Result<Waveform> {
    normalize_pcm16_at(bytes, DEFAULT_SAMPLE_RATE)
}

/// Decode a little-endian PCM16 buffer, dividing every sample by 32768.
pub fn normalize_pcm16_at(bytes: &[u8], sample_rate: u32) -> Result<Waveform> {
    if bytes.len() % 2 != 0 {
        return Err(PetCareError::Decode(format!(
            "PCM16 buffer length must be even, got {} bytes",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect();
    Ok(Waveform::new(samples, sample_rate))
}

/// Encode signed samples back into the little-endian wire layout.
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
