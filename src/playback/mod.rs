//! Streaming playback pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   push    ┌────────────┐   pop    ┌──────────────────────┐
//! │ Reader (thread)      │ ────────▶ │ ChunkQueue │ ───────▶ │ Player (thread)      │
//! │ PullSource::read     │   close   │ FIFO+flags │          │ PlaybackDevice::write│
//! └──────────────────────┘           └────────────┘          └──────────┬───────────┘
//!                                                                       │ rtrb ring
//!                                                                       ▼
//!                                                            ┌──────────────────────┐
//!                                                            │ cpal output callback │
//!                                                            └──────────────────────┘
//! ```
//!
//! [`PlaybackSession::start`] wires one reader and one player around a
//! fresh queue and returns a [`PlaybackHandle`] immediately. Completion is
//! signalled exactly once, after the device has been released.

mod chunk;
mod device;
mod format;
mod output;
mod player;
mod queue;
mod reader;
mod resampler;
mod session;
mod source;

pub use chunk::AudioChunk;
pub use device::{DeviceError, DeviceFactory, PlaybackDevice};
pub use format::{AudioFormat, SampleFormat};
pub use output::{CpalDevice, CpalFactory, default_output_device, list_output_devices, map_channels};
pub use player::{PlaybackReport, Player};
pub use queue::{CancelToken, ChunkQueue, Pop, PushError};
pub use reader::{Reader, ReaderStats};
pub use resampler::Resampler;
pub use session::{DEFAULT_QUEUE_CAPACITY, PlaybackHandle, PlaybackSession};
pub use source::{ChannelSource, PullSource, ReadSource};
