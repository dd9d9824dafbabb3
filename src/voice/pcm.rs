//! 16-bit PCM decoding into normalized float buffers

use std::time::Duration;

use crate::{Error, Result};

/// Sample rate of synthesized speech returned by the provider
pub const TTS_SAMPLE_RATE: u32 = 24000;

/// Layout of a raw PCM byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl PcmFormat {
    /// Mono 24 kHz, the provider's TTS output format
    pub const TTS: Self = Self {
        sample_rate: TTS_SAMPLE_RATE,
        channels: 1,
    };

    /// Bytes occupied by one interleaved frame
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        2 * self.channels as usize
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::TTS
    }
}

/// Decoded audio, one sample vector per channel, values in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples for one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Playback length
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Re-interleave channels into a single frame-ordered vector
    #[must_use]
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }

    /// Encode as a 16-bit WAV file
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let channels = u16::try_from(self.channels.len())
            .map_err(|_| Error::Audio("too many channels for WAV".to_string()))?;
        let spec = hound::WavSpec {
            channels: channels.max(1),
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Audio(e.to_string()))?;

            for sample in self.interleaved() {
                #[allow(clippy::cast_possible_truncation)]
                let sample_i16 = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
                writer
                    .write_sample(sample_i16)
                    .map_err(|e| Error::Audio(e.to_string()))?;
            }

            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

/// Decode little-endian 16-bit signed PCM into a normalized buffer
///
/// A trailing partial frame is dropped. Each sample is `value / 32768.0`,
/// so `i16::MIN` maps to exactly -1.0 and every other value lies in (-1.0, 1.0).
#[must_use]
pub fn decode_pcm16(bytes: &[u8], format: PcmFormat) -> AudioBuffer {
    let channel_count = usize::from(format.channels);
    if channel_count == 0 {
        return AudioBuffer {
            sample_rate: format.sample_rate,
            channels: Vec::new(),
        };
    }

    let frame_bytes = format.frame_bytes();
    let frames = bytes.len() / frame_bytes;
    let leftover = bytes.len() % frame_bytes;
    if leftover != 0 {
        tracing::debug!(leftover, len = bytes.len(), "dropping partial PCM frame");
    }

    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in channels.iter_mut().zip(frame.chunks_exact(2)) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel.push(f32::from(value) / 32768.0);
        }
    }

    AudioBuffer {
        sample_rate: format.sample_rate,
        channels,
    }
}
