//! Output device seam.
//!
//! A [`DeviceFactory`] is shared across sessions and called on the player
//! thread. The [`PlaybackDevice`] it returns lives and dies on that thread,
//! so it need not be `Send` (a `cpal::Stream` is not).

use super::format::AudioFormat;
use super::queue::CancelToken;

/// Device errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("No output device available")]
    NoDevice,

    #[error("Output device not found: {0}")]
    NotFound(String),

    #[error("Output device initialization failed: {0}")]
    Init(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Device write failed: {0}")]
    Write(String),

    #[error("Device stopped")]
    Stopped,
}

/// A started-on-demand PCM output accepting ordered, blocking writes.
///
/// Dropping the device releases it.
pub trait PlaybackDevice {
    /// Begin playback.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Write all of `data`, blocking until the device has accepted it.
    fn write(&mut self, data: &[u8]) -> Result<(), DeviceError>;

    /// Stop playback. With `drain`, audio already accepted is played out
    /// first; otherwise it is discarded.
    fn stop(&mut self, drain: bool) -> Result<(), DeviceError>;

    /// Called once after opening. A `write` blocked on the device should
    /// return [`DeviceError::Stopped`] soon after the token is cancelled.
    fn watch_cancel(&mut self, _token: CancelToken) {}
}

/// Opens playback devices for a given source format.
pub trait DeviceFactory: Send + Sync {
    /// Acquire a device. `buffer_size` is the chunk size in bytes the
    /// player will write.
    fn open(
        &self,
        format: &AudioFormat,
        buffer_size: usize,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError>;

    /// Human-readable name for logs.
    fn name(&self) -> String {
        "unnamed".to_string()
    }
}
