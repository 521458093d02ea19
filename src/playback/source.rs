//! Pull sources feeding the reader.
//!
//! A pull source exposes a single blocking read. `Ok(n)` with `n > 0` is
//! data, `Ok(0)` is end of stream, and any error is treated as end of
//! stream by the reader.

use std::io::{self, Read};

use crossbeam_channel::Receiver;

/// Blocking source of raw audio bytes.
pub trait PullSource: Send {
    /// Read up to `buf.len()` bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

impl PullSource for Box<dyn PullSource> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
}

/// Adapts any [`Read`] (file, stdin, socket, in-memory cursor).
#[derive(Debug)]
pub struct ReadSource<R> {
    inner: R,
}

impl<R: Read + Send> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> PullSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Source fed by a channel of byte blocks, for producers that push rather
/// than being pulled (e.g. a network callback).
///
/// Blocks larger than the read buffer are split across reads. A
/// disconnected channel is end of stream.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }
}

impl PullSource for ChannelSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.pending.len() {
            match self.rx.recv() {
                Ok(block) => {
                    self.pending = block;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
