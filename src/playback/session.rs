//! One end-to-end playback run: a reader thread and a player thread sharing
//! a [`ChunkQueue`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use super::device::DeviceFactory;
use super::format::AudioFormat;
use super::player::{Player, PlaybackReport};
use super::queue::ChunkQueue;
use super::reader::Reader;
use super::source::PullSource;
use crate::error::{Error, Result};

/// Default number of chunks buffered between reader and player.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Launches playback sessions with a fixed device factory and format.
#[derive(Clone)]
pub struct PlaybackSession {
    factory: Arc<dyn DeviceFactory>,
    format: AudioFormat,
    buffer_size: usize,
    queue_capacity: Option<usize>,
    drain_on_stop: bool,
}

impl PlaybackSession {
    pub fn new(factory: Arc<dyn DeviceFactory>, format: AudioFormat) -> Self {
        Self {
            factory,
            format,
            buffer_size: format.min_buffer_size(),
            queue_capacity: Some(DEFAULT_QUEUE_CAPACITY),
            drain_on_stop: true,
        }
    }

    /// Chunk size in bytes. Zero keeps the format's minimum buffer size.
    pub fn buffer_size(mut self, bytes: usize) -> Self {
        if bytes > 0 {
            self.buffer_size = bytes;
        }
        self
    }

    /// Queue capacity in chunks; `None` for unbounded.
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Whether the device plays out buffered audio when the stream ends.
    pub fn drain_on_stop(mut self, drain: bool) -> Self {
        self.drain_on_stop = drain;
        self
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Start playing `source` and return immediately.
    ///
    /// `on_done` runs exactly once on the player thread after the device
    /// has been released, or as soon as it is known no device is
    /// available. It still runs exactly once if a thread cannot be
    /// spawned and an error is returned, or if either thread panics.
    ///
    /// The session only counts as finished once `on_done` has returned, so
    /// the callback must not block on [`PlaybackHandle::wait`] for its own
    /// session: that wait can never succeed. [`PlaybackHandle::wait_timeout`]
    /// from inside the callback returns `None`.
    pub fn start<S, F>(&self, source: S, on_done: Option<F>) -> Result<PlaybackHandle>
    where
        S: PullSource + 'static,
        F: FnOnce() + Send + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(match self.queue_capacity {
            Some(cap) => ChunkQueue::bounded(cap),
            None => ChunkQueue::new(),
        });
        // Nothing is ever sent; dropping the sender after the report is
        // stored wakes every waiter at once.
        let (done_tx, done_rx) = bounded::<()>(0);
        let slot: Arc<Mutex<Option<PlaybackReport>>> = Arc::new(Mutex::new(None));

        // Shared so whichever path finishes the session fires it.
        let on_done = Arc::new(Mutex::new(on_done));
        let fire = {
            let on_done = Arc::clone(&on_done);
            move || {
                if let Some(f) = on_done.lock().take() {
                    f();
                }
            }
        };

        tracing::info!(
            session = id,
            format = %self.format,
            buffer_size = self.buffer_size,
            device = %self.factory.name(),
            "Starting playback session"
        );

        let player = Player::new(Arc::clone(&self.factory), self.format, self.buffer_size)
            .drain_on_stop(self.drain_on_stop);
        let mut completion = Completion {
            id,
            queue: Arc::clone(&queue),
            fire: Some(fire.clone()),
            slot: Arc::clone(&slot),
            done_tx: Some(done_tx),
            report: None,
        };
        let player_thread = thread::Builder::new()
            .name(format!("playback-player-{id}"))
            .spawn(move || {
                // Own the whole guard so it drops at the end of this thread
                let mut completion = completion;
                let report = player.run(&completion.queue);
                tracing::info!(
                    session = id,
                    chunks = report.chunks_written,
                    bytes = report.bytes_written,
                    cancelled = report.cancelled,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "Playback session finished"
                );
                completion.report = Some(report);
            });
        if let Err(e) = player_thread {
            queue.cancel();
            fire();
            return Err(Error::playback(format!("failed to spawn player thread: {e}")));
        }

        let reader = Reader::new(self.buffer_size);
        let reader_queue = Arc::clone(&queue);
        let mut source = source;
        let reader_thread = thread::Builder::new()
            .name(format!("playback-reader-{id}"))
            .spawn(move || {
                reader.run(&mut source, &reader_queue);
            });
        if let Err(e) = reader_thread {
            // Player is running and will fire on_done once it sees the cancel.
            queue.cancel();
            return Err(Error::playback(format!("failed to spawn reader thread: {e}")));
        }

        Ok(PlaybackHandle {
            id,
            queue,
            done_rx,
            slot,
        })
    }
}

/// Publishes a session's outcome when dropped at the end of the player
/// thread, whether it returned or unwound.
struct Completion<G: FnOnce()> {
    id: u64,
    queue: Arc<ChunkQueue>,
    fire: Option<G>,
    slot: Arc<Mutex<Option<PlaybackReport>>>,
    done_tx: Option<Sender<()>>,
    report: Option<PlaybackReport>,
}

impl<G: FnOnce()> Drop for Completion<G> {
    fn drop(&mut self) {
        let report = self.report.take().unwrap_or_else(|| {
            let reason = if thread::panicking() {
                "player thread panicked"
            } else {
                "player thread never ran"
            };
            tracing::error!(session = self.id, "{}, abandoning session", reason);
            // Unblocks a reader waiting on a full queue
            self.queue.cancel();
            PlaybackReport {
                cancelled: true,
                device_error: Some(reason.to_string()),
                ..PlaybackReport::default()
            }
        });

        // Waiters only return once the callback has run. A panicking
        // callback must not keep them waiting.
        if let Some(fire) = self.fire.take()
            && catch_unwind(AssertUnwindSafe(fire)).is_err()
        {
            tracing::error!(session = self.id, "Completion callback panicked");
        }
        *self.slot.lock() = Some(report);
        drop(self.done_tx.take());
    }
}

/// Handle to a running session. Clones observe the same session.
///
/// Dropping the handle does not stop playback.
#[derive(Clone)]
pub struct PlaybackHandle {
    id: u64,
    queue: Arc<ChunkQueue>,
    done_rx: Receiver<()>,
    slot: Arc<Mutex<Option<PlaybackReport>>>,
}

impl PlaybackHandle {
    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Abort playback. Queued audio is discarded and the device is stopped
    /// without draining; completion still fires once.
    pub fn cancel(&self) {
        if !self.queue.is_cancelled() {
            tracing::info!(session = self.id, "Cancelling playback session");
        }
        self.queue.cancel();
    }

    /// Whether the player has finished and released the device.
    pub fn is_finished(&self) -> bool {
        self.wait_timeout(Duration::ZERO).is_some()
    }

    /// Block until the session finishes.
    pub fn wait(&self) -> PlaybackReport {
        if let Some(report) = self.slot.lock().clone() {
            return report;
        }
        let _ = self.done_rx.recv();
        self.finished_report()
    }

    /// Block until the session finishes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PlaybackReport> {
        if let Some(report) = self.slot.lock().clone() {
            return Some(report);
        }
        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => None,
            _ => Some(self.finished_report()),
        }
    }

    fn finished_report(&self) -> PlaybackReport {
        self.slot.lock().clone().unwrap_or_else(|| {
            // Player thread died before storing a report
            PlaybackReport {
                cancelled: true,
                device_error: Some("player thread exited unexpectedly".to_string()),
                ..PlaybackReport::default()
            }
        })
    }
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.id)
            .field("queued", &self.queue.size())
            .field("cancelled", &self.queue.is_cancelled())
            .finish()
    }
}
