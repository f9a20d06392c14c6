//! Couples a readable stream to a writable stream.
//!
//! `pipe` moves framed chunks from `from` to `to` until the source
//! stops being readable, the sink stops being writable, a delimiter
//! terminates the transfer, or a byte cap is reached. By default the
//! sink is ended when the transfer finishes, on success and on error
//! alike.

use std::time::Duration;

use crate::delimiter::Delimiter;
use crate::error::StreamError;
use crate::stream::{ReadStream, WriteStream};

/// Parameters for [`pipe`].
#[derive(Debug, Clone)]
pub struct PipeOptions {
    /// End the sink once the transfer finishes (also on error).
    pub end_on_finish: bool,
    /// Transfer at most this many bytes; 0 means no cap.
    pub length: usize,
    /// Stop after the first chunk ending with this byte.
    pub delimiter: Delimiter,
    /// Deadline applied to each underlying read and write, not to the
    /// whole transfer.
    pub timeout: Option<Duration>,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self {
            end_on_finish: true,
            length: 0,
            delimiter: Delimiter::None,
            timeout: None,
        }
    }
}

/// Copy bytes from `from` into `to`.
///
/// Returns the total number of bytes transferred. An error in either
/// underlying operation aborts the transfer; when `end_on_finish` is
/// set and the sink is still writable it is ended first, then the
/// original error is returned. A read timeout mid-transfer surfaces as
/// [`StreamError::Timeout`] and leaves the source stream open.
pub async fn pipe<R, W>(from: &mut R, to: &mut W, options: PipeOptions) -> Result<usize, StreamError>
where
    R: ReadStream,
    W: WriteStream,
{
    let result = transfer(from, to, &options).await;

    if options.end_on_finish && to.is_writable() {
        match result {
            Ok(total) => {
                to.end(b"", options.timeout).await?;
                return Ok(total);
            }
            Err(err) => {
                // The transfer error wins over a failure to end.
                if let Err(end_err) = to.end(b"", options.timeout).await {
                    log::debug!("ending sink after failed pipe also failed: {end_err}");
                }
                return Err(err);
            }
        }
    }

    result
}

async fn transfer<R, W>(
    from: &mut R,
    to: &mut W,
    options: &PipeOptions,
) -> Result<usize, StreamError>
where
    R: ReadStream,
    W: WriteStream,
{
    let mut total = 0usize;
    let mut remaining = options.length;

    loop {
        let cap = if options.length > 0 { remaining } else { 0 };
        let chunk = from.read(cap, options.delimiter, options.timeout).await?;
        total += chunk.len();
        to.write(&chunk, options.timeout).await?;

        if !from.is_readable() || !to.is_writable() {
            break;
        }
        if options.delimiter.terminates(&chunk) {
            break;
        }
        if options.length > 0 {
            remaining = remaining.saturating_sub(chunk.len());
            if remaining == 0 {
                break;
            }
        }
    }

    Ok(total)
}
