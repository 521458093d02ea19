//! Consumer side of the pipeline: drains the queue into the output device.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::device::{DeviceFactory, PlaybackDevice};
use super::format::AudioFormat;
use super::queue::{ChunkQueue, Pop};

/// Outcome of one playback run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Chunks written to the device
    pub chunks_written: usize,
    /// Bytes written to the device
    pub bytes_written: usize,
    /// Whether a device was acquired
    pub device_opened: bool,
    /// Whether the session was cancelled before draining
    pub cancelled: bool,
    /// Why the device failed, if it did
    pub device_error: Option<String>,
    /// Wall time from player start to device release
    pub elapsed: Duration,
}

impl PlaybackReport {
    /// Audio time written, for the given format.
    pub fn audio_duration(&self, format: &AudioFormat) -> Duration {
        format.duration_of(self.bytes_written)
    }
}

/// Drives one output device from a [`ChunkQueue`].
pub struct Player {
    factory: Arc<dyn DeviceFactory>,
    format: AudioFormat,
    buffer_size: usize,
    drain_on_stop: bool,
}

impl Player {
    pub fn new(factory: Arc<dyn DeviceFactory>, format: AudioFormat, buffer_size: usize) -> Self {
        Self {
            factory,
            format,
            buffer_size,
            drain_on_stop: true,
        }
    }

    /// Whether `stop` plays out audio the device has already accepted.
    pub fn drain_on_stop(mut self, drain: bool) -> Self {
        self.drain_on_stop = drain;
        self
    }

    /// Play the queue to completion.
    ///
    /// Returns only once the queue is closed and drained, the session is
    /// cancelled, or the device failed. The device is stopped and released
    /// before returning. If no device can be opened, nothing is written and
    /// the queue is cancelled so the producer cannot block.
    pub fn run(&self, queue: &ChunkQueue) -> PlaybackReport {
        let started = Instant::now();
        let mut report = PlaybackReport::default();

        let mut device = match self.factory.open(&self.format, self.buffer_size) {
            Ok(device) => device,
            Err(e) => {
                tracing::warn!("Skipping playback, output device unavailable: {}", e);
                queue.cancel();
                report.device_error = Some(e.to_string());
                report.elapsed = started.elapsed();
                return report;
            }
        };
        report.device_opened = true;
        device.watch_cancel(queue.cancel_token());

        if let Err(e) = device.start() {
            tracing::warn!("Failed to start output device: {}", e);
            queue.cancel();
            report.device_error = Some(e.to_string());
        } else {
            self.drain(queue, device.as_mut(), &mut report);

            let drain = self.drain_on_stop && !report.cancelled;
            if let Err(e) = device.stop(drain) {
                tracing::warn!("Failed to stop output device: {}", e);
            }
        }

        drop(device);
        report.elapsed = started.elapsed();
        tracing::debug!(
            chunks = report.chunks_written,
            bytes = report.bytes_written,
            cancelled = report.cancelled,
            "Player finished"
        );
        report
    }

    fn drain(&self, queue: &ChunkQueue, device: &mut dyn PlaybackDevice, report: &mut PlaybackReport) {
        loop {
            match queue.pop() {
                Pop::Chunk(chunk) => {
                    if let Err(e) = device.write(&chunk) {
                        if queue.is_cancelled() {
                            // Write cut short by the cancel, not a device fault
                            report.cancelled = true;
                            break;
                        }
                        tracing::warn!("Output write failed, ending playback: {}", e);
                        report.device_error = Some(e.to_string());
                        queue.cancel();
                        break;
                    }
                    report.chunks_written += 1;
                    report.bytes_written += chunk.len();
                }
                Pop::Finished => break,
                Pop::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::chunk::AudioChunk;
    use crate::test_utils::{DeviceEvent, FailingFactory, RecordingFactory};
    use std::thread;

    fn chunk(bytes: &[u8]) -> AudioChunk {
        AudioChunk::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_writes_chunks_in_order_then_stops() {
        let factory = RecordingFactory::new();
        let queue = ChunkQueue::new();
        queue.push(chunk(&[1; 10])).unwrap();
        queue.push(chunk(&[2; 10])).unwrap();
        queue.close();

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 10).run(&queue);

        assert!(report.device_opened);
        assert_eq!(report.chunks_written, 2);
        assert_eq!(report.bytes_written, 20);
        assert_eq!(
            factory.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Start,
                DeviceEvent::Write(vec![1; 10]),
                DeviceEvent::Write(vec![2; 10]),
                DeviceEvent::Stop { drain: true },
                DeviceEvent::Release,
            ]
        );
    }

    #[test]
    fn test_empty_closed_queue_starts_and_stops() {
        let factory = RecordingFactory::new();
        let queue = ChunkQueue::new();
        queue.close();

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 10).run(&queue);

        assert_eq!(report.chunks_written, 0);
        assert_eq!(
            factory.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Start,
                DeviceEvent::Stop { drain: true },
                DeviceEvent::Release,
            ]
        );
    }

    #[test]
    fn test_device_failure_skips_playback() {
        let queue = ChunkQueue::new();
        queue.push(chunk(&[1; 4])).unwrap();

        let report = Player::new(Arc::new(FailingFactory), AudioFormat::default(), 4).run(&queue);

        assert!(!report.device_opened);
        assert!(report.device_error.is_some());
        assert_eq!(report.chunks_written, 0);
        assert!(queue.is_cancelled());
    }

    #[test]
    fn test_waits_for_producer_before_exiting() {
        let factory = RecordingFactory::new();
        let queue = Arc::new(ChunkQueue::new());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                // Queue is transiently empty while the producer is active
                thread::sleep(Duration::from_millis(40));
                queue.push(chunk(&[5; 3])).unwrap();
                thread::sleep(Duration::from_millis(40));
                queue.push(chunk(&[6; 3])).unwrap();
                queue.close();
            })
        };

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 3).run(&queue);
        producer.join().unwrap();

        assert_eq!(report.chunks_written, 2);
        assert_eq!(factory.written(), vec![vec![5; 3], vec![6; 3]]);
    }

    #[test]
    fn test_drains_queue_when_done_flag_already_set() {
        let factory = RecordingFactory::new();
        let queue = ChunkQueue::new();
        for i in 0..5u8 {
            queue.push(chunk(&[i; 2])).unwrap();
        }
        queue.close();

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 2).run(&queue);

        assert_eq!(report.chunks_written, 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_write_failure_ends_playback() {
        let factory = RecordingFactory::new().fail_write_at(1);
        let queue = ChunkQueue::new();
        for i in 0..3u8 {
            queue.push(chunk(&[i; 2])).unwrap();
        }
        queue.close();

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 2).run(&queue);

        assert_eq!(report.chunks_written, 1);
        assert!(report.device_error.is_some());
        assert!(factory.events().contains(&DeviceEvent::Release));
    }

    #[test]
    fn test_cancel_stops_without_draining() {
        let factory = RecordingFactory::new();
        let queue = ChunkQueue::new();
        queue.push(chunk(&[1; 2])).unwrap();
        queue.cancel();

        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 2).run(&queue);

        assert!(report.cancelled);
        assert_eq!(report.chunks_written, 0);
        assert!(factory.events().contains(&DeviceEvent::Stop { drain: false }));
    }

    #[test]
    fn test_cancel_interrupts_blocked_write() {
        // Each write would take far longer than the test is willing to wait
        let factory = RecordingFactory::new().with_write_delay(Duration::from_secs(30));
        let queue = Arc::new(ChunkQueue::new());
        queue.push(chunk(&[1; 2])).unwrap();

        let canceller = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.cancel();
            })
        };

        let started = Instant::now();
        let report = Player::new(factory.clone().shared(), AudioFormat::default(), 2).run(&queue);
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.cancelled);
        assert_eq!(report.device_error, None);
        assert_eq!(report.chunks_written, 0);
        assert_eq!(
            factory.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Start,
                DeviceEvent::Stop { drain: false },
                DeviceEvent::Release,
            ]
        );
    }
}
