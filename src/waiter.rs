//! One-shot completion cells for pending stream operations.
//!
//! A `Waiter` is held by the stream; the matching `WaitHandle` is held
//! by the suspended task. Resolution and rejection are terminal: the
//! cell fires exactly once. Cancellation is dropping the handle, which
//! the stream observes through `is_cancelled` on its next touch.
//!
//! Timeouts compose around the receive side. An elapsed deadline does
//! not consume the cell, so the owner of the handle can still pick up
//! a resolution that raced the timer (`try_result`) after it has
//! removed its entry from the stream under the lock.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::StreamError;

/// Resolution side, stored inside the stream.
pub(crate) struct Waiter<T> {
    tx: oneshot::Sender<Result<T, StreamError>>,
    id: u64,
}

/// Suspension side, awaited by the blocked task.
pub(crate) struct WaitHandle<T> {
    rx: oneshot::Receiver<Result<T, StreamError>>,
}

/// Create a linked waiter pair. The `id` is minted by the owning
/// stream so it can later identify exactly this entry.
pub(crate) fn waiter<T>(id: u64) -> (Waiter<T>, WaitHandle<T>) {
    let (tx, rx) = oneshot::channel();
    (Waiter { tx, id }, WaitHandle { rx })
}

impl<T> Waiter<T> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Whether the waiting side has dropped its handle.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Fire the cell with a value.
    pub(crate) fn resolve(self, value: T) {
        let _ = self.tx.send(Ok(value));
    }

    /// Fire the cell with an error.
    pub(crate) fn reject(self, error: StreamError) {
        let _ = self.tx.send(Err(error));
    }
}

impl<T> WaitHandle<T> {
    /// Await the resolution, bounded by `timeout` when given.
    ///
    /// Returns:
    /// - `Ok(value)` / `Err(error)`: whatever the stream fired
    /// - `Err(Timeout)`: the deadline elapsed first (cell not consumed)
    /// - `Err(Closed)`: the stream dropped the waiter without firing it
    pub(crate) async fn wait(&mut self, timeout: Option<Duration>) -> Result<T, StreamError> {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut self.rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(StreamError::Closed),
                Err(_) => Err(StreamError::Timeout),
            },
            None => match (&mut self.rx).await {
                Ok(result) => result,
                Err(_) => Err(StreamError::Closed),
            },
        }
    }

    /// Pick up a resolution that raced a timeout, if any.
    pub(crate) fn try_result(&mut self) -> Option<Result<T, StreamError>> {
        self.rx.try_recv().ok()
    }
}
