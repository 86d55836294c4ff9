//! Planar PCM buffer construction from interleaved sample data.
//!
//! Callers hand over flat interleaved f32 arrays; the platform recognizer
//! consumes non-interleaved (planar) multi-channel buffers. The conversion
//! lives here so every backend gets the same validated layout.

use crate::error::{HarkError, Result};

/// Amplitude below which a sample counts as silence.
const SILENCE_EPSILON: f32 = 1e-4;

/// A non-interleaved multi-channel PCM buffer, float32, normalized to [-1, 1].
#[derive(Debug, Clone)]
pub struct PcmBuffer {
    planes: Vec<Vec<f32>>,
    sample_rate: f64,
}

impl PcmBuffer {
    /// Builds a planar buffer from a flat interleaved sample sequence.
    ///
    /// `frame_count` is `samples.len() / channels` (floor); a trailing sample
    /// of an odd-length stereo input is dropped. Mono input takes a single
    /// bulk copy; stereo is de-interleaved element by element since the
    /// layout change is an index remapping, not a memory copy.
    pub fn from_interleaved(samples: &[f32], sample_rate: f64, channels: u16) -> Result<Self> {
        if samples.is_empty() {
            return Err(HarkError::invalid_input("empty audio buffer"));
        }
        if channels == 0 || channels > 2 {
            return Err(HarkError::invalid_input(format!(
                "invalid channel count {channels} (must be 1 or 2)"
            )));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(HarkError::invalid_input(format!(
                "invalid sample rate {sample_rate}"
            )));
        }

        let channels = channels as usize;
        let frame_count = samples.len() / channels;
        if frame_count == 0 {
            return Err(HarkError::invalid_input("no complete audio frames"));
        }

        let planes = if channels == 1 {
            vec![samples[..frame_count].to_vec()]
        } else {
            let mut planes = vec![vec![0.0f32; frame_count]; channels];
            for frame in 0..frame_count {
                for (channel, plane) in planes.iter_mut().enumerate() {
                    plane[frame] = samples[frame * channels + channel];
                }
            }
            planes
        };

        Ok(Self {
            planes,
            sample_rate,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.planes[0].len()
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Samples of one channel plane.
    pub fn plane(&self, channel: usize) -> &[f32] {
        &self.planes[channel]
    }

    /// Re-interleaves the planes back into a flat sample sequence.
    pub fn interleaved(&self) -> Vec<f32> {
        let channels = self.channel_count();
        if channels == 1 {
            return self.planes[0].clone();
        }
        let mut out = vec![0.0f32; self.frame_count() * channels];
        for frame in 0..self.frame_count() {
            for (channel, plane) in self.planes.iter().enumerate() {
                out[frame * channels + channel] = plane[frame];
            }
        }
        out
    }

    /// True when no sample rises above the silence threshold.
    pub fn is_silence(&self) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.iter().all(|s| s.abs() < SILENCE_EPSILON))
    }
}
