//! Blocking FIFO shared by the reader and the player.
//!
//! The queue doubles as a closable channel: the reader calls
//! [`ChunkQueue::close`] after its last push, and the player drains until
//! [`Pop::Finished`], which is only returned once the queue is both closed
//! and empty. Cancellation wakes every waiter on either side.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::chunk::AudioChunk;

/// Result of a blocking pop.
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// Next chunk in playback order
    Chunk(AudioChunk),
    /// Producer is done and every chunk has been handed out
    Finished,
    /// Session was cancelled; remaining chunks are abandoned
    Cancelled,
}

/// Push rejected. The chunk is handed back.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("queue closed by producer")]
    Closed(AudioChunk),

    #[error("playback cancelled")]
    Cancelled(AudioChunk),
}

impl PushError {
    /// Recover the rejected chunk.
    pub fn into_chunk(self) -> AudioChunk {
        match self {
            PushError::Closed(chunk) | PushError::Cancelled(chunk) => chunk,
        }
    }
}

/// Lock-free view of a queue's cancel flag, for code that blocks outside
/// the queue (a device write waiting on a full ring buffer).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct State {
    chunks: VecDeque<AudioChunk>,
    closed: bool,
    cancelled: bool,
}

/// Thread-safe queue of audio chunks with a producer-done flag.
#[derive(Debug)]
pub struct ChunkQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
    token: CancelToken,
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: None,
            token: CancelToken::default(),
        }
    }

    /// Create a queue holding at most `capacity` chunks (minimum 1).
    ///
    /// `push` blocks while the queue is full.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// Maximum number of queued chunks, if bounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append a chunk to the tail.
    pub fn push(&self, chunk: AudioChunk) -> Result<(), PushError> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(PushError::Cancelled(chunk));
            }
            if state.closed {
                return Err(PushError::Closed(chunk));
            }
            match self.capacity {
                Some(cap) if state.chunks.len() >= cap => self.not_full.wait(&mut state),
                _ => break,
            }
        }
        state.chunks.push_back(chunk);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the head chunk without blocking.
    pub fn try_pop(&self) -> Option<AudioChunk> {
        let chunk = self.state.lock().chunks.pop_front();
        if chunk.is_some() {
            self.not_full.notify_one();
        }
        chunk
    }

    /// Block until a chunk is available, the queue is drained and closed,
    /// or the session is cancelled.
    pub fn pop(&self) -> Pop {
        let mut state = self.state.lock();
        loop {
            if let Some(pop) = self.take(&mut state) {
                return pop;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop), giving up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Pop> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(pop) = self.take(&mut state) {
                return Some(pop);
            }
            if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return self.take(&mut state);
            }
        }
    }

    fn take(&self, state: &mut State) -> Option<Pop> {
        if state.cancelled {
            return Some(Pop::Cancelled);
        }
        if let Some(chunk) = state.chunks.pop_front() {
            self.not_full.notify_one();
            return Some(Pop::Chunk(chunk));
        }
        if state.closed {
            return Some(Pop::Finished);
        }
        None
    }

    /// Number of queued chunks.
    pub fn size(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Alias for [`size`](Self::size).
    pub fn len(&self) -> usize {
        self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Mark the producer as done. Idempotent; never reset.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Whether the producer is done.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Abandon the session. Queued chunks are dropped and every blocked
    /// caller is woken.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock();
            state.cancelled = true;
            state.chunks.clear();
        }
        self.token.set();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Token that observes [`cancel`](Self::cancel) without taking the lock.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }
}
