//! Descriptor-backed streams.
//!
//! The same stream contract as the in-memory variant, with the buffer
//! replaced by the descriptor's own: the read side keeps only a small
//! holdover for delimiter splitting, the write side keeps a backlog of
//! requests that have not fully reached the descriptor yet.
//!
//! Single-reader exclusion is by `&mut self`: the borrow checker rules
//! out a second concurrent `read()` on the same half at compile time.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::buffer::ByteBuffer;
use crate::delimiter::Delimiter;
use crate::error::StreamError;
use crate::stream::{ReadStream, WriteStream};

/// Read size used when the caller sets no length cap.
const DEFAULT_CHUNK: usize = 8192;

/// Readable half over a non-blocking descriptor.
pub struct FdReadStream<R> {
    inner: R,
    holdover: ByteBuffer,
    open: bool,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FdReadStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            holdover: ByteBuffer::new(),
            open: true,
            eof: false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Open, and not yet at EOF with an empty holdover.
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.open && !(self.eof && self.holdover.is_empty())
    }

    /// Close the readable half. Held-over bytes are discarded.
    pub fn close(&mut self) {
        if !self.open {
            log::warn!("close() called on an already-closed read stream");
            return;
        }
        self.open = false;
        self.holdover.clear();
    }

    /// Read one framed chunk.
    ///
    /// Held-over bytes from an earlier descriptor read are served
    /// first. Otherwise one descriptor read of up to `length` bytes
    /// (a default chunk when uncapped) is performed and framed
    /// together with the holdover; the unframed tail is held over.
    ///
    /// Returns:
    /// - `Ok(chunk)`: framed bytes
    /// - `Ok(empty)`: EOF; the stream closes
    /// - `Err(Unreadable)`: closed, or already past EOF
    /// - `Err(Timeout)`: the deadline elapsed before readiness
    /// - `Err(Failure)`: descriptor error
    pub async fn read(
        &mut self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError> {
        if !self.is_readable() {
            return Err(StreamError::Unreadable);
        }

        if !self.holdover.is_empty() {
            return Ok(self.holdover.remove(length, delimiter));
        }

        let want = if length == 0 { DEFAULT_CHUNK } else { length };
        let mut scratch = vec![0u8; want];
        let n = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.read(&mut scratch)).await {
                Ok(result) => result?,
                Err(_) => return Err(StreamError::Timeout),
            },
            None => self.inner.read(&mut scratch).await?,
        };

        if n == 0 {
            // EOF is one empty chunk, after which the stream is closed.
            self.eof = true;
            self.open = false;
            return Ok(Vec::new());
        }

        self.holdover.push(&scratch[..n]);
        Ok(self.holdover.remove(length, delimiter))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> fmt::Debug for FdReadStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FdReadStream(open={}, eof={}, holdover={})",
            self.open,
            self.eof,
            self.holdover.len()
        )
    }
}

impl<R: AsyncRead + Unpin> ReadStream for FdReadStream<R> {
    fn is_open(&self) -> bool {
        FdReadStream::is_open(self)
    }

    fn is_readable(&self) -> bool {
        FdReadStream::is_readable(self)
    }

    async fn read(
        &mut self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError> {
        FdReadStream::read(self, length, delimiter, timeout).await
    }
}

/// One write request that has not fully reached the descriptor.
struct PendingWrite {
    data: Vec<u8>,
    written: usize,
}

/// Writable half over a non-blocking descriptor.
pub struct FdWriteStream<W> {
    inner: W,
    backlog: VecDeque<PendingWrite>,
    writable: bool,
}

impl<W: AsyncWrite + Unpin> FdWriteStream<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            backlog: VecDeque::new(),
            writable: true,
        }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Bytes accepted by `write` but not yet pushed to the descriptor.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.backlog
            .iter()
            .map(|request| request.data.len() - request.written)
            .sum()
    }

    /// Stop accepting writes. Backlogged bytes are discarded; the
    /// descriptor itself is closed when the stream is dropped.
    pub fn close(&mut self) {
        if !self.writable {
            log::warn!("close() called on an already-closed write stream");
            return;
        }
        self.writable = false;
        self.backlog.clear();
    }

    /// Write `data`, resolving with `data.len()` once the whole
    /// backlog, this request included, has reached the descriptor.
    ///
    /// A write whose future is dropped mid-flight leaves its partial
    /// progress in the backlog; the next call resumes it before
    /// touching new data. A zero-byte write drains the backlog and
    /// resolves with 0, acting as a ready-to-write barrier.
    pub async fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        if !self.writable {
            return Err(StreamError::Unwritable);
        }
        if !data.is_empty() {
            self.backlog.push_back(PendingWrite {
                data: data.to_vec(),
                written: 0,
            });
        }
        self.flush_backlog(timeout).await?;
        Ok(data.len())
    }

    /// Write `data`, then shut the descriptor down for writing.
    pub async fn end(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        let written = self.write(data, timeout).await?;
        self.writable = false;
        self.inner.shutdown().await?;
        Ok(written)
    }

    async fn flush_backlog(&mut self, timeout: Option<Duration>) -> Result<(), StreamError> {
        while let Some(head) = self.backlog.front_mut() {
            while head.written < head.data.len() {
                let pending = &head.data[head.written..];
                let n = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, self.inner.write(pending)).await
                    {
                        Ok(result) => result?,
                        Err(_) => return Err(StreamError::Timeout),
                    },
                    None => self.inner.write(pending).await?,
                };
                if n == 0 {
                    self.writable = false;
                    return Err(StreamError::Failure(
                        "descriptor accepted no bytes".to_string(),
                    ));
                }
                head.written += n;
            }
            self.backlog.pop_front();
        }
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> fmt::Debug for FdWriteStream<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FdWriteStream(writable={}, backlog={})",
            self.writable,
            self.backlog.len()
        )
    }
}

impl<W: AsyncWrite + Unpin> WriteStream for FdWriteStream<W> {
    fn is_writable(&self) -> bool {
        FdWriteStream::is_writable(self)
    }

    async fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        FdWriteStream::write(self, data, timeout).await
    }

    async fn end(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        FdWriteStream::end(self, data, timeout).await
    }
}

/// Duplex stream over one descriptor, split into the two halves.
pub struct FdStream<S> {
    reader: FdReadStream<ReadHalf<S>>,
    writer: FdWriteStream<WriteHalf<S>>,
}

impl<S: AsyncRead + AsyncWrite> FdStream<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: FdReadStream::new(read_half),
            writer: FdWriteStream::new(write_half),
        }
    }

    /// Take the two halves apart, e.g. to move them to separate tasks.
    pub fn split(self) -> (FdReadStream<ReadHalf<S>>, FdWriteStream<WriteHalf<S>>) {
        (self.reader, self.writer)
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.reader.is_open()
    }

    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.reader.is_readable()
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writer.is_writable()
    }

    /// Close both halves.
    pub fn close(&mut self) {
        self.reader.close();
        self.writer.close();
    }

    pub async fn read(
        &mut self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError> {
        self.reader.read(length, delimiter, timeout).await
    }

    pub async fn write(
        &mut self,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<usize, StreamError> {
        self.writer.write(data, timeout).await
    }

    pub async fn end(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError> {
        self.writer.end(data, timeout).await
    }
}

impl<S> fmt::Debug for FdStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FdStream(reader={:?}, writer={:?})", self.reader, self.writer)
    }
}
