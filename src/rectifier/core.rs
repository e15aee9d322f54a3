//! Prefetcher state machine, independent of the HTTP driver
//!
//! Tracks the byte stream arriving from the origin, the read cursor, and
//! the waiters registered for stream targets. The driver feeds chunks and
//! obeys the pause/resume decisions; readers register targets and consume
//! buffered bytes in arrival order.

use crate::error::NtStatus;
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Floor for the look-ahead window.
pub const MIN_CACHE_SIZE: u64 = 2 * 1024 * 1024;

/// Look-ahead window for a file of `size` bytes, fixed at construction.
pub fn cache_size_for(size: u64) -> u64 {
    (size / 10).max(MIN_CACHE_SIZE)
}

/// Driver instruction after a chunk arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Pause,
}

/// Outcome of registering interest in a stream target.
pub enum Registration {
    /// The bytes up to the target (or end of stream) are already buffered.
    Ready,
    /// Delivery deferred until the stream reaches the target.
    Wait(oneshot::Receiver<std::result::Result<(), NtStatus>>),
    /// The stream already failed or was closed.
    Failed(NtStatus),
}

struct Waiter {
    target: u64,
    tx: oneshot::Sender<std::result::Result<(), NtStatus>>,
}

pub struct RectifierCore {
    /// Total remote object size.
    size: u64,
    cache_size: u64,
    /// Absolute offset of the next byte to hand to a reader.
    read_pos: u64,
    /// Absolute offset one past the last byte received.
    position: u64,
    buffers: VecDeque<Bytes>,
    /// Buffered byte count; always `position - read_pos`.
    length: u64,
    /// High-water mark of requested targets. Reads are monotone, so this
    /// only grows.
    farthest: u64,
    tasks: Vec<Waiter>,
    loaded: bool,
    paused: bool,
    closed: bool,
    failed: Option<NtStatus>,
}

impl RectifierCore {
    pub fn new(size: u64, start_offset: u64) -> Self {
        Self {
            size,
            cache_size: cache_size_for(size),
            read_pos: start_offset,
            position: start_offset,
            buffers: VecDeque::new(),
            length: 0,
            farthest: start_offset,
            tasks: Vec::new(),
            loaded: false,
            paused: false,
            closed: false,
            failed: None,
        }
    }

    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn buffered(&self) -> u64 {
        self.length
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The origin ignored the range request; the stream restarts at byte 0.
    pub fn reset_whole_body(&mut self) {
        self.read_pos = 0;
        self.position = 0;
        self.buffers.clear();
        self.length = 0;
    }

    /// Feed one arrived chunk. Returns the pause decision for the driver.
    pub fn on_chunk(&mut self, chunk: Bytes) -> Flow {
        if self.closed || chunk.is_empty() {
            return if self.closed { Flow::Pause } else { Flow::Continue };
        }
        self.length += chunk.len() as u64;
        self.position += chunk.len() as u64;
        self.buffers.push_back(chunk);
        self.update_tasks();

        if self.position.saturating_sub(self.farthest) > self.cache_size {
            self.paused = true;
            Flow::Pause
        } else {
            Flow::Continue
        }
    }

    /// The upstream body ended.
    pub fn on_complete(&mut self) {
        self.loaded = true;
        self.update_tasks();
    }

    /// The upstream failed; every outstanding waiter is failed with the
    /// translated status.
    pub fn on_error(&mut self, status: NtStatus) {
        self.failed = Some(status);
        for waiter in self.tasks.drain(..) {
            let _ = waiter.tx.send(Err(status));
        }
    }

    fn update_tasks(&mut self) {
        let position = self.position;
        let size = self.size;
        let loaded = self.loaded;
        let mut remaining = Vec::new();
        for waiter in self.tasks.drain(..) {
            if waiter.target <= position || (waiter.target > size && loaded) {
                let _ = waiter.tx.send(Ok(()));
            } else {
                remaining.push(waiter);
            }
        }
        self.tasks = remaining;
    }

    /// Register interest in `target`. The boolean asks the driver to resume
    /// a paused upstream.
    pub fn register(&mut self, target: u64) -> (Registration, bool) {
        if self.closed {
            return (Registration::Failed(NtStatus::Unsuccessful), false);
        }
        if let Some(status) = self.failed {
            return (Registration::Failed(status), false);
        }

        if target > self.farthest {
            self.farthest = target;
        }
        let mut resume = false;
        if self.paused && self.position.saturating_sub(self.farthest) < self.cache_size / 5 {
            self.paused = false;
            resume = true;
        }

        if target <= self.position || (target > self.size && self.loaded) {
            return (Registration::Ready, resume);
        }

        let (tx, rx) = oneshot::channel();
        self.tasks.push(Waiter { target, tx });
        (Registration::Wait(rx), resume)
    }

    /// Consume up to `buf.len()` bytes at absolute offset `pos`.
    ///
    /// Reads must be monotone: a position before the read cursor is a
    /// precondition violation. A position ahead of the cursor discards the
    /// intervening bytes. Returns the bytes copied, clamped to what is
    /// buffered.
    pub fn consume(&mut self, buf: &mut [u8], pos: u64) -> std::result::Result<usize, NtStatus> {
        if self.closed {
            return Err(NtStatus::Unsuccessful);
        }
        if pos < self.read_pos {
            return Err(NtStatus::Unsuccessful);
        }
        if pos > self.read_pos {
            let skip = (pos - self.read_pos).min(self.length);
            self.drop_front(skip);
        }

        let want = (buf.len() as u64).min(self.length) as usize;
        let mut copied = 0;
        while copied < want {
            let mut chunk = match self.buffers.pop_front() {
                Some(chunk) => chunk,
                None => break,
            };
            let take = chunk.len().min(want - copied);
            buf[copied..copied + take].copy_from_slice(&chunk[..take]);
            copied += take;
            if take < chunk.len() {
                self.buffers.push_front(chunk.split_off(take));
            }
        }
        self.read_pos += copied as u64;
        self.length -= copied as u64;
        Ok(copied)
    }

    fn drop_front(&mut self, mut n: u64) {
        self.read_pos += n;
        self.length -= n;
        while n > 0 {
            let mut chunk = match self.buffers.pop_front() {
                Some(chunk) => chunk,
                None => break,
            };
            if (chunk.len() as u64) <= n {
                n -= chunk.len() as u64;
            } else {
                self.buffers.push_front(chunk.split_off(n as usize));
                n = 0;
            }
        }
    }

    /// Tear down: outstanding waiters are dropped and the driver aborts.
    pub fn close(&mut self) {
        self.closed = true;
        self.tasks.clear();
        self.buffers.clear();
        self.length = 0;
    }
}
