//! Audio output using cpal.
//!
//! Blocking writes from the player thread are converted to f32, resampled
//! and channel-mapped if the device cannot run at the stream format, then
//! pushed into a lock-free ring buffer that the real-time cpal callback
//! drains. A full ring buffer blocks the writer, which paces the player at
//! the device's playback rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat as CpalSampleFormat, SampleRate, Stream, StreamConfig};

use super::device::{DeviceError, DeviceFactory, PlaybackDevice};
use super::format::AudioFormat;
use super::queue::CancelToken;
use super::resampler::Resampler;

/// Ring buffer length in milliseconds of device audio.
const RING_BUFFER_MS: usize = 200;

/// Give up on a write if the device accepts nothing for this long.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Sleep between checks while the ring buffer is full or draining.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Opens cpal output devices.
#[derive(Debug, Clone, Default)]
pub struct CpalFactory {
    /// Preferred device name (case-insensitive substring); `None` = default
    device_name: Option<String>,
}

impl CpalFactory {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name: device_name.filter(|n| !n.trim().is_empty()),
        }
    }

    fn select_device(&self, host: &cpal::Host) -> Result<Device, DeviceError> {
        let Some(wanted) = &self.device_name else {
            return host.default_output_device().ok_or(DeviceError::NoDevice);
        };

        let wanted_lower = wanted.to_lowercase();
        let devices = host
            .output_devices()
            .map_err(|e| DeviceError::Init(e.to_string()))?;
        for device in devices {
            if let Ok(name) = device.name()
                && name.to_lowercase().contains(&wanted_lower)
            {
                tracing::info!("Selected output device: {}", name);
                return Ok(device);
            }
        }
        Err(DeviceError::NotFound(wanted.clone()))
    }
}

impl DeviceFactory for CpalFactory {
    fn open(
        &self,
        format: &AudioFormat,
        _buffer_size: usize,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        if !format.is_valid() {
            return Err(DeviceError::UnsupportedFormat(format.to_string()));
        }
        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let (config, sample_format) = choose_config(&device, format)?;
        tracing::info!(
            "Output format: {}Hz, {} channels, {:?} (stream {})",
            config.sample_rate.0,
            config.channels,
            sample_format,
            format
        );

        Ok(Box::new(CpalDevice::new(&device, config, sample_format, *format)?))
    }

    fn name(&self) -> String {
        self.device_name.clone().unwrap_or_else(|| "default".to_string())
    }
}

/// Prefer a config matching the stream exactly; fall back to the device
/// default and convert.
fn choose_config(
    device: &Device,
    format: &AudioFormat,
) -> Result<(StreamConfig, CpalSampleFormat), DeviceError> {
    if let Ok(ranges) = device.supported_output_configs() {
        let rate = SampleRate(format.sample_rate);
        let exact = ranges
            .filter(|r| r.channels() == format.channels)
            .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
            .filter(|r| is_supported_sample_format(r.sample_format()))
            .max_by_key(|r| r.sample_format() == CpalSampleFormat::I16);
        if let Some(range) = exact {
            let supported = range.with_sample_rate(rate);
            let sample_format = supported.sample_format();
            return Ok((supported.config(), sample_format));
        }
    }

    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::Init(e.to_string()))?;
    let sample_format = supported.sample_format();
    if !is_supported_sample_format(sample_format) {
        return Err(DeviceError::UnsupportedFormat(format!("{sample_format:?}")));
    }
    Ok((supported.config(), sample_format))
}

fn is_supported_sample_format(format: CpalSampleFormat) -> bool {
    matches!(
        format,
        CpalSampleFormat::F32 | CpalSampleFormat::I16 | CpalSampleFormat::U16 | CpalSampleFormat::I32
    )
}

/// State shared with the cpal callback.
struct Shared {
    /// Callback ran with an empty ring buffer while playing
    underruns: AtomicU64,
    /// Stream reported an error
    failed: AtomicBool,
}

/// A cpal output stream fed through an `rtrb` ring buffer.
pub struct CpalDevice {
    stream: Stream,
    producer: rtrb::Producer<f32>,
    capacity: usize,
    shared: Arc<Shared>,
    stream_format: AudioFormat,
    device_channels: usize,
    resampler: Resampler,
    decoder: PcmDecoder,
    cancel: Option<CancelToken>,
    started: bool,
}

impl CpalDevice {
    fn new(
        device: &Device,
        config: StreamConfig,
        sample_format: CpalSampleFormat,
        stream_format: AudioFormat,
    ) -> Result<Self, DeviceError> {
        let device_channels = config.channels.max(1) as usize;
        let capacity = (config.sample_rate.0 as usize * device_channels * RING_BUFFER_MS / 1000).max(device_channels);
        let (producer, consumer) = rtrb::RingBuffer::new(capacity);
        let shared = Arc::new(Shared {
            underruns: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        });

        let stream = match sample_format {
            CpalSampleFormat::F32 => build_stream::<f32>(device, &config, consumer, Arc::clone(&shared)),
            CpalSampleFormat::I16 => build_stream::<i16>(device, &config, consumer, Arc::clone(&shared)),
            CpalSampleFormat::U16 => build_stream::<u16>(device, &config, consumer, Arc::clone(&shared)),
            CpalSampleFormat::I32 => build_stream::<i32>(device, &config, consumer, Arc::clone(&shared)),
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        }
        .map_err(|e| DeviceError::Init(e.to_string()))?;

        // Some hosts start streams on creation; hold off until start().
        let _ = stream.pause();

        let resampler = Resampler::new(stream_format.sample_rate, config.sample_rate.0, stream_format.channels)?;

        Ok(Self {
            stream,
            producer,
            capacity,
            shared,
            stream_format,
            device_channels,
            resampler,
            decoder: PcmDecoder::new(stream_format.channels),
            cancel: None,
            started: false,
        })
    }

    /// Times the device ran dry while playing.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Push device-format samples, blocking while the ring buffer is full.
    fn push_all(&mut self, samples: &[f32]) -> Result<(), DeviceError> {
        push_blocking(&mut self.producer, samples, &self.shared.failed, self.cancel.as_ref())
    }

    /// Wait for the callback to consume everything queued.
    fn wait_drained(&self) {
        // The ring never holds more than RING_BUFFER_MS of audio
        let deadline = Instant::now() + Duration::from_millis(RING_BUFFER_MS as u64 * 2 + 500);
        while self.producer.slots() < self.capacity && Instant::now() < deadline {
            if self.shared.failed.load(Ordering::Acquire) {
                return;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl PlaybackDevice for CpalDevice {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.stream.play().map_err(|e| DeviceError::Init(e.to_string()))?;
        self.started = true;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        if !self.started {
            return Err(DeviceError::Stopped);
        }
        let frames = self.decoder.decode(data);
        let resampled = self.resampler.process(&frames)?;
        let mapped = map_channels(&resampled, self.stream_format.channels as usize, self.device_channels);
        self.push_all(&mapped)
    }

    fn stop(&mut self, drain: bool) -> Result<(), DeviceError> {
        if !self.started {
            return Ok(());
        }
        if self.decoder.pending_bytes() > 0 {
            tracing::debug!("Dropping {} bytes of incomplete frame", self.decoder.pending_bytes());
        }
        if drain {
            let tail = self.resampler.flush()?;
            let mapped = map_channels(&tail, self.stream_format.channels as usize, self.device_channels);
            self.push_all(&mapped)?;
            self.wait_drained();
        }
        self.started = false;
        self.stream.pause().map_err(|e| DeviceError::Write(e.to_string()))
    }

    fn watch_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let underruns = self.underruns();
        if underruns > 0 {
            tracing::debug!("Output device released after {} underruns", underruns);
        }
    }
}

/// Decodes s16le bytes into whole interleaved f32 frames.
///
/// Writes may split a sample or a frame anywhere. An odd trailing byte and
/// the samples of an incomplete frame are held back for the next call.
#[derive(Debug)]
struct PcmDecoder {
    channels: usize,
    /// Odd byte left over from the previous call
    carry: Option<u8>,
    /// Samples of a frame not yet complete
    partial: Vec<f32>,
}

impl PcmDecoder {
    fn new(channels: u16) -> Self {
        Self {
            channels: channels.max(1) as usize,
            carry: None,
            partial: Vec::new(),
        }
    }

    fn decode(&mut self, data: &[u8]) -> Vec<f32> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        bytes.extend(self.carry.take());
        bytes.extend_from_slice(data);
        if bytes.len() % 2 == 1 {
            self.carry = bytes.pop();
        }

        let mut samples = std::mem::take(&mut self.partial);
        samples.extend(
            bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
        );

        let whole = samples.len() - samples.len() % self.channels;
        self.partial = samples.split_off(whole);
        samples
    }

    /// Bytes received but not yet part of a whole frame.
    fn pending_bytes(&self) -> usize {
        usize::from(self.carry.is_some()) + self.partial.len() * 2
    }
}

/// Push every sample into the ring, sleeping while it is full.
///
/// Fails if the stream reports an error, the consumer makes no progress for
/// [`STALL_TIMEOUT`], or `cancel` fires.
fn push_blocking(
    producer: &mut rtrb::Producer<f32>,
    samples: &[f32],
    failed: &AtomicBool,
    cancel: Option<&CancelToken>,
) -> Result<(), DeviceError> {
    let mut last_progress = Instant::now();
    let mut pos = 0;
    while pos < samples.len() {
        if failed.load(Ordering::Acquire) {
            return Err(DeviceError::Write("output stream failed".to_string()));
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(DeviceError::Stopped);
        }
        let free = producer.slots();
        if free == 0 {
            if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(DeviceError::Write("output stalled".to_string()));
            }
            thread::sleep(POLL_INTERVAL);
            continue;
        }
        let n = free.min(samples.len() - pos);
        for &sample in &samples[pos..pos + n] {
            // Slot count was checked above and only this thread pushes
            if producer.push(sample).is_err() {
                break;
            }
            pos += 1;
        }
        last_progress = Instant::now();
    }
    Ok(())
}

/// Build an output stream draining `consumer`, outputting silence on underrun.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: rtrb::Consumer<f32>,
    shared: Arc<Shared>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let err_shared = Arc::clone(&shared);
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut starved = false;
            for sample in data.iter_mut() {
                *sample = match consumer.pop() {
                    Ok(s) => T::from_sample(s),
                    Err(_) => {
                        starved = true;
                        T::from_sample(0.0f32)
                    }
                };
            }
            if starved {
                shared.underruns.fetch_add(1, Ordering::Relaxed);
            }
        },
        move |err| {
            tracing::error!("Audio stream error: {}", err);
            err_shared.failed.store(true, Ordering::Release);
        },
        None,
    )
}

/// Convert interleaved audio between channel counts.
///
/// Downmixing to mono averages; otherwise output channel `c` takes input
/// channel `c % from`, so mono is copied to every output channel.
pub fn map_channels(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    let from = from.max(1);
    let to = to.max(1);
    if from == to {
        return input.to_vec();
    }

    let frames = input.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in input.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame[c % from]));
        }
    }
    out
}

/// List output device names.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Name of the default output device.
pub fn default_output_device() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|d| d.name().ok())
}
