use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::error::{BusError, BusResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl FrameFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Bytes of one interleaved sample frame (all channels).
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn block_len(&self, block_frames: usize) -> usize {
        self.bytes_per_frame() * block_frames
    }
}

/// A timestamped block of interleaved PCM. The payload is an immutable
/// shared buffer, so clones handed to consumers never alias the ring slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioFrame {
    pub timestamp_ms: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data: Bytes,
}

impl AudioFrame {
    pub fn new(timestamp_ms: i64, format: FrameFormat, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp_ms,
            sample_rate: format.sample_rate,
            channels: format.channels,
            bits_per_sample: format.bits_per_sample,
            data: data.into(),
        }
    }

    /// Builds a 16-bit native-endian frame from interleaved samples.
    pub fn from_i16(timestamp_ms: i64, sample_rate: u32, channels: u16, samples: &[i16]) -> Self {
        let data = Bytes::copy_from_slice(bytemuck::cast_slice(samples));
        Self::new(timestamp_ms, FrameFormat::new(sample_rate, channels, 16), data)
    }

    pub fn format(&self) -> FrameFormat {
        FrameFormat::new(self.sample_rate, self.channels, self.bits_per_sample)
    }

    /// Number of interleaved sample frames in the payload.
    pub fn sample_frames(&self) -> usize {
        match self.format().bytes_per_frame() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_frames() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Decodes a 16-bit native-endian payload. Returns `None` for other widths.
    pub fn samples_i16(&self) -> Option<Vec<i16>> {
        if self.bits_per_sample != 16 || self.data.len() % 2 != 0 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(2)
                .map(|b| i16::from_ne_bytes([b[0], b[1]]))
                .collect(),
        )
    }

    /// Checks the format metadata and payload length. With `block_frames`
    /// set, the payload must hold exactly that many sample frames.
    pub fn validate(&self, block_frames: Option<usize>) -> BusResult<()> {
        if self.sample_rate == 0 {
            return Err(BusError::malformed("sample rate is zero"));
        }
        if self.channels == 0 {
            return Err(BusError::malformed("channel count is zero"));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(BusError::malformed(format!(
                "unsupported sample width {} bits",
                self.bits_per_sample
            )));
        }
        if self.data.is_empty() {
            return Err(BusError::malformed("empty payload"));
        }

        let format = self.format();
        match block_frames {
            Some(frames) => {
                let expected = format.block_len(frames);
                if self.data.len() != expected {
                    return Err(BusError::malformed(format!(
                        "payload is {} bytes, expected {} ({} frames x {} ch x {} bit)",
                        self.data.len(),
                        expected,
                        frames,
                        self.channels,
                        self.bits_per_sample
                    )));
                }
            }
            None => {
                if self.data.len() % format.bytes_per_frame() != 0 {
                    return Err(BusError::malformed(format!(
                        "payload of {} bytes is not a whole number of {}-byte sample frames",
                        self.data.len(),
                        format.bytes_per_frame()
                    )));
                }
            }
        }
        Ok(())
    }
}
