//! Producer side of the pipeline: pulls chunks from a source into the queue.

use std::io::ErrorKind;

use super::chunk::AudioChunk;
use super::queue::{ChunkQueue, PushError};
use super::source::PullSource;

/// Counters from one reader run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Chunks pushed to the queue
    pub chunks: usize,
    /// Bytes pushed to the queue
    pub bytes: usize,
    /// Whether the run ended because the source failed
    pub source_error: bool,
    /// Whether the run ended because the session was cancelled
    pub cancelled: bool,
}

/// Pulls fixed-size reads from a [`PullSource`] until it is exhausted.
#[derive(Debug, Clone)]
pub struct Reader {
    buffer_size: usize,
}

impl Reader {
    /// Create a reader issuing reads of up to `buffer_size` bytes (minimum 1).
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Read until end of stream, error or cancellation, then close the queue.
    ///
    /// Every read yielding at least one byte becomes exactly one chunk of
    /// that length. The queue is closed on every exit path, including a
    /// panic inside the source.
    pub fn run<S: PullSource + ?Sized>(&self, source: &mut S, queue: &ChunkQueue) -> ReaderStats {
        let close = CloseOnDrop(queue);
        let mut stats = ReaderStats::default();
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            if queue.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n.min(buf.len()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Audio source read failed, ending stream: {}", e);
                    stats.source_error = true;
                    break;
                }
            };

            let Some(chunk) = AudioChunk::from_slice(&buf[..n]) else {
                break;
            };

            match queue.push(chunk) {
                Ok(()) => {
                    stats.chunks += 1;
                    stats.bytes += n;
                }
                Err(PushError::Cancelled(_)) => {
                    stats.cancelled = true;
                    break;
                }
                Err(PushError::Closed(_)) => {
                    tracing::warn!("Queue closed before reader finished");
                    break;
                }
            }
        }

        drop(close);
        tracing::debug!(
            chunks = stats.chunks,
            bytes = stats.bytes,
            cancelled = stats.cancelled,
            "Reader finished"
        );
        stats
    }
}

/// Closes the queue when dropped, so the player sees end of stream even if
/// the source unwinds.
struct CloseOnDrop<'a>(&'a ChunkQueue);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!("Audio source panicked, ending stream");
        }
        self.0.close();
    }
}
