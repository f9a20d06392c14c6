//! The stream contract shared by the in-memory and descriptor-backed
//! variants. `pipe` is generic over these traits, and test doubles
//! implement them directly.

use std::time::Duration;

use crate::delimiter::Delimiter;
use crate::error::StreamError;

/// Readable side of a byte stream.
#[allow(async_fn_in_trait)]
pub trait ReadStream {
    /// Whether the stream has not yet fully closed.
    fn is_open(&self) -> bool;

    /// Whether a read can still deliver bytes.
    fn is_readable(&self) -> bool;

    /// Read one framed chunk.
    ///
    /// `length == 0` means no length cap. The delimiter byte, when hit,
    /// is included in the chunk. `timeout` bounds the suspension when
    /// no data is buffered; `None` waits indefinitely.
    async fn read(
        &mut self,
        length: usize,
        delimiter: Delimiter,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, StreamError>;
}

/// Writable side of a byte stream.
#[allow(async_fn_in_trait)]
pub trait WriteStream {
    /// Whether a write can still be accepted.
    fn is_writable(&self) -> bool;

    /// Write `data`, resolving with `data.len()` once accepted.
    async fn write(&mut self, data: &[u8], timeout: Option<Duration>)
        -> Result<usize, StreamError>;

    /// Write `data`, then half-close: no further writes are accepted,
    /// buffered bytes remain readable until drained.
    async fn end(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<usize, StreamError>;
}
