//! Test fixtures: scripted pull sources and recording output devices.
//!
//! # Example
//!
//! ```ignore
//! let factory = RecordingFactory::new();
//! let session = PlaybackSession::new(factory.clone().shared(), AudioFormat::default());
//! session.start(ScriptedSource::from_sizes(&[10, 10]), None::<fn()>)?.wait();
//! assert_eq!(factory.written().len(), 2);
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::playback::{AudioFormat, CancelToken, DeviceError, DeviceFactory, PlaybackDevice, PullSource};

/// A source that replays a fixed script of reads, then reports end of stream.
#[derive(Debug)]
pub struct ScriptedSource {
    script: VecDeque<Result<Vec<u8>, io::ErrorKind>>,
    endless: Option<usize>,
    reads: usize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<u8>, io::ErrorKind>>) -> Self {
        Self {
            script: script.into(),
            endless: None,
            reads: 0,
        }
    }

    /// One read per size. Read `i` yields bytes `i, i+1, ...` so every
    /// chunk is distinguishable.
    pub fn from_sizes(sizes: &[usize]) -> Self {
        Self::new(
            sizes
                .iter()
                .enumerate()
                .map(|(i, &len)| Ok((0..len).map(|j| (i + j) as u8).collect()))
                .collect(),
        )
    }

    /// A source that never ends, yielding `size` bytes per read.
    pub fn endless(size: usize) -> Self {
        Self {
            endless: Some(size),
            ..Self::new(Vec::new())
        }
    }

    /// Remaining scripted payloads, in order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.script.iter().filter_map(|r| r.as_ref().ok().cloned()).collect()
    }

    /// Number of read calls made.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl PullSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        if let Some(size) = self.endless {
            let n = size.min(buf.len());
            buf[..n].fill(0x55);
            return Ok(n);
        }
        match self.script.pop_front() {
            Some(Ok(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(kind)) => Err(io::Error::new(kind, "scripted failure")),
            None => Ok(0),
        }
    }
}

/// A source that yields its payloads, then panics on the next read.
#[derive(Debug)]
pub struct PanickingSource {
    payloads: VecDeque<Vec<u8>>,
}

impl PanickingSource {
    pub fn after(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads: payloads.into(),
        }
    }
}

impl PullSource for PanickingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(payload) = self.payloads.pop_front() else {
            panic!("source failed mid-stream");
        };
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }
}

/// Calls observed by a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Open,
    Start,
    Write(Vec<u8>),
    Stop { drain: bool },
    Release,
}

/// Factory producing devices that record every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingFactory {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    write_delay: Duration,
    fail_write_at: Option<usize>,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep on every write, imitating a device playing in real time. A
    /// cancel interrupts the sleep and fails the write with `Stopped`.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Fail the write with this zero-based index.
    pub fn fail_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    pub fn shared(self) -> Arc<dyn DeviceFactory> {
        Arc::new(self)
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().clone()
    }

    /// Payloads of successful writes, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DeviceFactory for RecordingFactory {
    fn open(
        &self,
        _format: &AudioFormat,
        _buffer_size: usize,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        self.events.lock().push(DeviceEvent::Open);
        Ok(Box::new(RecordingDevice {
            events: Arc::clone(&self.events),
            write_delay: self.write_delay,
            fail_write_at: self.fail_write_at,
            writes: 0,
            cancel: None,
        }))
    }

    fn name(&self) -> String {
        "recording".to_string()
    }
}

/// Device that appends every call to a shared log.
pub struct RecordingDevice {
    events: Arc<Mutex<Vec<DeviceEvent>>>,
    write_delay: Duration,
    fail_write_at: Option<usize>,
    writes: usize,
    cancel: Option<CancelToken>,
}

impl RecordingDevice {
    fn sleep_unless_cancelled(&self) -> Result<(), DeviceError> {
        let deadline = Instant::now() + self.write_delay;
        while Instant::now() < deadline {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(DeviceError::Stopped);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(left.min(Duration::from_millis(2)));
        }
        Ok(())
    }
}

impl PlaybackDevice for RecordingDevice {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.events.lock().push(DeviceEvent::Start);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            return Err(DeviceError::Write("scripted failure".to_string()));
        }
        self.sleep_unless_cancelled()?;
        self.events.lock().push(DeviceEvent::Write(data.to_vec()));
        Ok(())
    }

    fn stop(&mut self, drain: bool) -> Result<(), DeviceError> {
        self.events.lock().push(DeviceEvent::Stop { drain });
        Ok(())
    }

    fn watch_cancel(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        self.events.lock().push(DeviceEvent::Release);
    }
}

/// Factory whose devices never initialize.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingFactory;

impl DeviceFactory for FailingFactory {
    fn open(
        &self,
        _format: &AudioFormat,
        _buffer_size: usize,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        Err(DeviceError::Init("device not initialized".to_string()))
    }
}

/// Factory whose driver panics while opening.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingFactory;

impl DeviceFactory for PanickingFactory {
    fn open(
        &self,
        _format: &AudioFormat,
        _buffer_size: usize,
    ) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        panic!("output driver crashed");
    }
}
