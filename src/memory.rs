//! In-memory duplex byte stream.
//!
//! A `MemoryStream` owns a byte buffer and coordinates one pending
//! reader with any number of writers:
//! - at most one read may be suspended at a time (a second concurrent
//!   read fails with `Busy`);
//! - writers that push the buffer past the high-water mark suspend in
//!   FIFO order until a reader drains the buffer back to the mark;
//! - `end` half-closes the stream, leaving buffered bytes readable
//!   until drained, after which the stream closes on its own.
//!
//! All state lives behind a `parking_lot::Mutex` that is never held
//! across an await; suspended operations are parked on one-shot
//! waiter cells and woken strictly after the lock is released.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::buffer::ByteBuffer;
use crate::delimiter::Delimiter;
use crate::error::StreamError;
use crate::pipe::{pipe, PipeOptions};
use crate::stream::{ReadStream, WriteStream};
use crate::waiter::{waiter, Waiter};

/// Construction parameters for [`MemoryStream`].
#[derive(Debug, Clone, Default)]
pub struct StreamConfig {
    /// Buffer length above which writers suspend until a reader drains
    /// the buffer back down to the mark. 0 disables backpressure.
    pub high_water_mark: usize,
    /// Bytes readable immediately after construction.
    pub initial: Vec<u8>,
}

/// A suspended read and its framing request.
struct ReadWaiter {
    waiter: Waiter<Vec<u8>>,
    length: usize,
    delimiter: Delimiter,
}

struct Shared {
    buffer: ByteBuffer,
    open: bool,
    writable: bool,
    high_water_mark: usize,
    next_waiter_id: u64,
    read_waiter: Option<ReadWaiter>,
    write_queue: VecDeque<Waiter<()>>,
}

impl Shared {
    fn next_id(&mut self) -> u64 {
        self.next_waiter_id += 1;
        self.next_waiter_id
    }

    /// Drop a reader slot whose task abandoned its pending read.
    fn clear_cancelled_reader(&mut self) {
        if self
            .read_waiter
            .as_ref()
            .is_some_and(|rw| rw.waiter.is_cancelled())
        {
            self.read_waiter = None;
        }
    }

    /// Transitions that follow a reader taking bytes out of the
    /// buffer: a drained half-closed stream closes, and writers
    /// suspended on the high-water mark are released (FIFO) once the
    /// buffer is back at or below the mark.
    ///
    /// Returned waiters must be resolved after the lock is dropped.
    fn after_drain(&mut self) -> Vec<Waiter<()>> {
        if !self.writable && self.buffer.is_empty() {
            self.open = false;
        }
        if self.high_water_mark > 0
            && !self.write_queue.is_empty()
            && self.buffer.len() <= self.high_water_mark
        {
            return self.write_queue.drain(..).collect();
        }
        Vec::new()
    }
}

/// Duplex in-memory byte stream.
///
/// Cloning produces another handle to the same stream; clones can be
/// moved to other tasks to act as producer and consumer ends.
#[derive(Clone)]
pub struct MemoryStream {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryStream {
    /// Create an open, writable stream with no backpressure and no
    /// initial data.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StreamConfig::default())
    }

    /// Create a stream from explicit configuration.
    #[must_use]
    pub fn with_config(config: StreamConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                buffer: ByteBuffer::from_bytes(&config.initial),
                open: true,
                writable: true,
                high_water_mark: config.high_water_mark,
                next_waiter_id: 0,
                read_waiter: None,
                write_queue: VecDeque::new(),
            })),
        }
    }

    /// Whether the stream has not yet fully closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Whether a read can still deliver bytes. Same as [`is_open`]
    /// for the in-memory variant.
    ///
    /// [`is_open`]: MemoryStream::is_open
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.is_open()
    }

    /// Whether writes are still accepted.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.shared.lock().writable
    }

    /// Number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    /// Close the stream.
    ///
    /// Idempotent. The first effective call rejects the pending reader
    /// and every queued writer with [`StreamError::Closed`]; buffered
    /// bytes are discarded.
    pub fn close(&self) {
        let (reader, writers) = {
            let mut shared = self.shared.lock();
            if !shared.open {
                log::warn!("close() called on an already-closed stream");
                return;
            }
            shared.open = false;
            shared.writable = false;
            shared.buffer.clear();
            (
                shared.read_waiter.take(),
                shared.write_queue.drain(..).collect::<Vec<_>>(),
            )
        };

        // Reject outside the lock.
        if let Some(rw) = reader {
            rw.waiter.reject(StreamError::Closed);
        }
        for writer in writers {
            writer.reject(StreamError::Closed);
        }
    }

    /// Read one framed chunk.
    ///
    /// `length == 0` means no length cap; a matched `delimiter` byte is
    /// included in the chunk. When the buffer is non-empty the chunk is
    /// returned without suspending. When it is empty, the read suspends
    /// until the next write, an `end`, a `close`, or the `timeout`.
    ///
    /// Returns:
    /// - `Ok(chunk)`: framed bytes (never empty)
    /// - `Err(Unreadable)`: the stream is closed
    /// - `Err(Busy)`: another read is already suspended
    /// - `Err(Closed)`: the stream closed underneath the suspended read
    /// - `Err(Timeout)`: the deadline elapsed first
    ///
    /// # Important behavior
    ///
    /// Dropping the returned future while suspended cancels the read;
    /// the slot is reclaimed and a fresh `read` behaves like the first.
    pub async fn read(
        &self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError> {
        let (mut handle, id) = {
            let mut shared = self.shared.lock();
            if !shared.open {
                return Err(StreamError::Unreadable);
            }
            shared.clear_cancelled_reader();
            if shared.read_waiter.is_some() {
                return Err(StreamError::Busy);
            }

            if !shared.buffer.is_empty() {
                let chunk = shared.buffer.remove(length, delimiter);
                let woken = shared.after_drain();
                drop(shared);
                if !woken.is_empty() {
                    log::debug!("read released {} queued writer(s)", woken.len());
                }
                for writer in woken {
                    writer.resolve(());
                }
                return Ok(chunk);
            }

            let id = shared.next_id();
            let (cell, handle) = waiter(id);
            shared.read_waiter = Some(ReadWaiter {
                waiter: cell,
                length,
                delimiter,
            });
            (handle, id)
        };

        match handle.wait(timeout).await {
            Err(StreamError::Timeout) => {
                let mut shared = self.shared.lock();
                if shared
                    .read_waiter
                    .as_ref()
                    .is_some_and(|rw| rw.waiter.id() == id)
                {
                    shared.read_waiter = None;
                    return Err(StreamError::Timeout);
                }
                drop(shared);
                // Resolved between the deadline and the cleanup.
                handle.try_result().unwrap_or(Err(StreamError::Timeout))
            }
            result => result,
        }
    }

    /// Write `data`.
    ///
    /// Returns:
    /// - `Ok(data.len())`: the bytes were accepted (an empty write
    ///   resolves with 0 and wakes no reader)
    /// - `Err(Unwritable)`: the stream was ended or closed
    /// - `Err(Timeout)`: the backpressure suspension outlived the
    ///   deadline; this closes the stream and fails every other queued
    ///   writer with the same cause
    /// - `Err(Closed)`: the stream closed while the write was queued
    ///
    /// # Important behavior
    ///
    /// A pending reader is satisfied by the write that first makes the
    /// buffer non-empty, framed with the reader's own request. If the
    /// buffer then exceeds the high-water mark, this write suspends
    /// until a reader drains the buffer back to the mark; queued
    /// writers resume in FIFO order.
    pub async fn write(&self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        self.write_inner(data, false, timeout).await
    }

    /// Write `data`, then half-close.
    ///
    /// After `end`, `is_writable()` is false. The stream stays open
    /// until readers drain the buffer; an `end` that leaves the buffer
    /// empty closes the stream at once and rejects a pending reader
    /// with [`StreamError::Closed`].
    pub async fn end(&self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        self.write_inner(data, true, timeout).await
    }

    /// Copy this stream into `to`; see [`pipe`].
    pub async fn pipe_to<W: WriteStream>(
        &mut self,
        to: &mut W,
        options: PipeOptions,
    ) -> Result<usize, StreamError> {
        pipe(self, to, options).await
    }

    async fn write_inner(
        &self,
        data: &[u8],
        half_close: bool,
        timeout: Option<Duration>,
    ) -> Result<usize, StreamError> {
        let suspended = {
            let mut shared = self.shared.lock();
            if !shared.writable {
                return Err(StreamError::Unwritable);
            }
            shared.buffer.push(data);

            // The write that first makes the buffer non-empty satisfies
            // the pending reader, framed with the reader's request.
            let mut resolution = None;
            if !shared.buffer.is_empty() {
                if let Some(rw) = shared.read_waiter.take() {
                    if rw.waiter.is_cancelled() {
                        // Reader task went away; the bytes stay buffered.
                    } else {
                        let chunk = shared.buffer.remove(rw.length, rw.delimiter);
                        resolution = Some((rw.waiter, chunk));
                    }
                }
            }

            let mut rejected = None;
            if half_close {
                shared.writable = false;
                if shared.buffer.is_empty() {
                    shared.open = false;
                    if let Some(rw) = shared.read_waiter.take() {
                        rejected = Some(rw.waiter);
                    }
                }
            }

            let suspended = if shared.high_water_mark > 0
                && shared.buffer.len() > shared.high_water_mark
            {
                let id = shared.next_id();
                let (cell, handle) = waiter(id);
                shared.write_queue.push_back(cell);
                Some((handle, id))
            } else {
                None
            };

            drop(shared);
            if let Some((reader, chunk)) = resolution {
                reader.resolve(chunk);
            }
            if let Some(reader) = rejected {
                reader.reject(StreamError::Closed);
            }
            suspended
        };

        let Some((mut handle, id)) = suspended else {
            return Ok(data.len());
        };

        match handle.wait(timeout).await {
            Ok(()) => Ok(data.len()),
            Err(StreamError::Timeout) => {
                let others = {
                    let mut shared = self.shared.lock();
                    if !shared.write_queue.iter().any(|w| w.id() == id) {
                        drop(shared);
                        // Released between the deadline and the cleanup.
                        return match handle.try_result() {
                            Some(Ok(())) => Ok(data.len()),
                            Some(Err(err)) => Err(err),
                            None => Err(StreamError::Timeout),
                        };
                    }
                    // Backpressure timeout is fatal: the stream closes
                    // and every queued writer fails with the same cause.
                    shared.open = false;
                    shared.writable = false;
                    shared.buffer.clear();
                    shared
                        .write_queue
                        .drain(..)
                        .filter(|w| w.id() != id)
                        .collect::<Vec<_>>()
                };
                log::warn!("backpressure write timed out, stream closed");
                for writer in others {
                    writer.reject(StreamError::Timeout);
                }
                Err(StreamError::Timeout)
            }
            Err(err) => Err(err),
        }
    }
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        write!(
            f,
            "MemoryStream(open={}, writable={}, buffered={}, reader_pending={}, queued_writers={})",
            shared.open,
            shared.writable,
            shared.buffer.len(),
            shared.read_waiter.is_some(),
            shared.write_queue.len()
        )
    }
}

impl ReadStream for MemoryStream {
    fn is_open(&self) -> bool {
        MemoryStream::is_open(self)
    }

    fn is_readable(&self) -> bool {
        MemoryStream::is_readable(self)
    }

    async fn read(
        &mut self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError> {
        MemoryStream::read(self, length, delimiter, timeout).await
    }
}

impl WriteStream for MemoryStream {
    fn is_writable(&self) -> bool {
        MemoryStream::is_writable(self)
    }

    async fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        MemoryStream::write(self, data, timeout).await
    }

    async fn end(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        MemoryStream::end(self, data, timeout).await
    }
}
