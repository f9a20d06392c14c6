//! Error taxonomy for stream operations.

/// Error type shared by all stream variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The stream is closed for reading.
    #[error("stream is not readable")]
    Unreadable,

    /// The stream is closed for writing (ended or fully closed).
    #[error("stream is not writable")]
    Unwritable,

    /// The stream was closed while the operation was pending.
    #[error("stream closed")]
    Closed,

    /// Another read is already pending on this stream.
    #[error("read already pending")]
    Busy,

    /// The operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,

    /// A parameter was outside its accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An I/O failure on the underlying descriptor.
    #[error("i/o failure: {0}")]
    Failure(String),
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Failure(err.to_string())
    }
}
