//! Sample rate conversion for devices that cannot run at the stream rate.
//!
//! Speech audio arrives at 16 kHz; most desktop devices only accept 44.1 or
//! 48 kHz. Without conversion the audio would play at the wrong speed.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

use super::device::DeviceError;

/// Frames fed to rubato per processing call.
const CHUNK_FRAMES: usize = 512;

/// Interleaved f32 resampler.
pub struct Resampler {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Per-channel samples waiting for a full chunk
    input_buffer: Vec<Vec<f32>>,
}

impl Resampler {
    /// Create a resampler. Matching rates pass audio through untouched.
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self, DeviceError> {
        let channels = channels.max(1) as usize;

        let resampler = if input_rate == output_rate {
            None
        } else {
            let r = FftFixedIn::<f32>::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| DeviceError::UnsupportedFormat(format!("resampler: {e}")))?;
            tracing::info!("Resampler: {}Hz → {}Hz ({} channels)", input_rate, output_rate, channels);
            Some(r)
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
        })
    }

    pub fn needs_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Output rate over input rate.
    pub fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    /// Resample interleaved input made of whole frames.
    ///
    /// Output lags input by up to one chunk; call [`flush`](Self::flush) at
    /// end of stream. A rubato failure is returned rather than skipped, so
    /// audio is never dropped silently.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, DeviceError> {
        if input.len() % self.channels != 0 {
            return Err(DeviceError::Write(format!(
                "{} samples is not a whole number of {}-channel frames",
                input.len(),
                self.channels
            )));
        }
        let Some(ref mut resampler) = self.resampler else {
            return Ok(input.to_vec());
        };

        for (i, sample) in input.iter().enumerate() {
            self.input_buffer[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.input_buffer[0].len() >= CHUNK_FRAMES {
            let chunks: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_FRAMES).collect())
                .collect();

            let resampled = resampler
                .process(&chunks, None)
                .map_err(|e| DeviceError::Write(format!("resampling failed: {e}")))?;
            interleave_into(&resampled, usize::MAX, &mut output);
        }
        Ok(output)
    }

    /// Pad and convert whatever is still buffered.
    pub fn flush(&mut self) -> Result<Vec<f32>, DeviceError> {
        let ratio = self.ratio();
        let Some(ref mut resampler) = self.resampler else {
            return Ok(Vec::new());
        };

        let remaining = self.input_buffer[0].len();
        if remaining == 0 {
            return Ok(Vec::new());
        }

        for ch in &mut self.input_buffer {
            ch.resize(CHUNK_FRAMES, 0.0);
        }
        let chunks = std::mem::replace(&mut self.input_buffer, vec![Vec::new(); self.channels]);

        let resampled = resampler
            .process(&chunks, None)
            .map_err(|e| DeviceError::Write(format!("resampling failed: {e}")))?;
        // Drop the padding
        let expected = (remaining as f64 * ratio).ceil() as usize;
        let mut output = Vec::new();
        interleave_into(&resampled, expected, &mut output);
        Ok(output)
    }
}

fn interleave_into(channels: &[Vec<f32>], max_frames: usize, out: &mut Vec<f32>) {
    let Some(first) = channels.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    out.reserve(frames * channels.len());
    for frame in 0..frames {
        for ch in channels {
            out.push(ch[frame]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_resampling_when_rates_match() {
        let resampler = Resampler::new(16_000, 16_000, 1).unwrap();
        assert!(!resampler.needs_resampling());
    }

    #[test]
    fn test_passthrough_when_no_resampling() {
        let mut resampler = Resampler::new(48_000, 48_000, 2).unwrap();
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resampler.process(&input).unwrap(), input);
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_upsampling_produces_more_frames() {
        let mut resampler = Resampler::new(16_000, 48_000, 1).unwrap();
        assert!((resampler.ratio() - 3.0).abs() < 1e-9);

        let input = vec![0.0f32; 16_000];
        let mut out = resampler.process(&input).unwrap();
        out.extend(resampler.flush().unwrap());

        // One second in, roughly one second out
        let expected = 48_000usize;
        let tolerance = CHUNK_FRAMES * 3 * 2;
        assert!(out.len().abs_diff(expected) <= tolerance, "got {}", out.len());
    }

    #[test]
    fn test_partial_frame_is_an_error() {
        let mut resampler = Resampler::new(16_000, 48_000, 2).unwrap();
        let err = resampler.process(&[0.1, 0.2, 0.3]).unwrap_err();
        assert!(matches!(err, DeviceError::Write(_)));

        // Nothing was buffered by the rejected call
        assert!(resampler.flush().unwrap().is_empty());
        assert_eq!(resampler.process(&[0.1, 0.2]).unwrap(), Vec::<f32>::new());
    }

    #[test]
    fn test_passthrough_rejects_partial_frame() {
        let mut resampler = Resampler::new(48_000, 48_000, 2).unwrap();
        assert!(resampler.process(&[0.5]).is_err());
    }
}
