//! PCM format description for the playback pipeline.

use std::time::Duration;

/// Duration of audio the device-preferred buffer holds.
const MIN_BUFFER_DURATION_MS: u32 = 40;

/// PCM sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit little endian
    #[default]
    S16Le,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
        }
    }
}

/// Format of the raw audio delivered by the pull source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample encoding
    pub sample_format: SampleFormat,
}

impl Default for AudioFormat {
    /// 16 kHz mono s16le, the speech service output format.
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            sample_format: SampleFormat::S16Le,
        }
    }
}

impl AudioFormat {
    /// Create a s16le format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::S16Le,
        }
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    /// Bytes of audio per second.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Device-preferred chunk size in bytes.
    ///
    /// This is 40 ms of audio rounded up to a whole frame, and never less
    /// than one frame. Default format: 1280 bytes.
    pub fn min_buffer_size(&self) -> usize {
        let frame = self.bytes_per_frame().max(1);
        let frames = (self.sample_rate as usize * MIN_BUFFER_DURATION_MS as usize).div_ceil(1000);
        (frames * frame).max(frame)
    }

    /// Playback time represented by `bytes` of audio.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }

    /// Check the format is usable.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz / {}ch / s16le", self.sample_rate, self.channels)
    }
}
