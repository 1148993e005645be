//! Adapters that turn common producers into batch streams.
//!
//! How batches are produced is up to the caller; these are the thin
//! conversions most callers need:
//!
//! - [`from_future`]: one-shot asynchronous load (a single batch, or an error)
//! - [`from_batches`]: a fixed sequence of batches
//! - [`channel`]: a push source fed from anywhere through a [`BatchSender`]

use crate::error::{Error, Result};
use futures::channel::mpsc;
use futures::{Future, Stream};
use std::fmt::Display;

/// Receiving half of [`channel`]. Pass it to `ChangeSetBuilder::observe`.
pub type BatchReceiver<V> = mpsc::UnboundedReceiver<Result<Vec<V>>>;

/// Stream yielding the output of `future` as one batch.
///
/// A failed load becomes `Error::SourceError`.
pub fn from_future<V, E, F>(future: F) -> impl Stream<Item = Result<Vec<V>>> + Send + 'static
where
    F: Future<Output = std::result::Result<Vec<V>, E>> + Send + 'static,
    E: Display,
    V: Send + 'static,
{
    futures::stream::once(async move {
        future
            .await
            .map_err(|e| Error::SourceError(e.to_string()))
    })
}

/// Stream yielding each batch of `batches` in turn.
pub fn from_batches<V, I>(batches: I) -> impl Stream<Item = Result<Vec<V>>> + Send + 'static
where
    I: IntoIterator<Item = Vec<V>>,
    I::IntoIter: Send + 'static,
    V: Send + 'static,
{
    futures::stream::iter(batches.into_iter().map(Ok))
}

/// Create a push source.
pub fn channel<V>() -> (BatchSender<V>, BatchReceiver<V>) {
    let (sender, receiver) = mpsc::unbounded();
    (BatchSender { sender }, receiver)
}

/// Sending half of a push source. Cheap to clone.
pub struct BatchSender<V> {
    sender: mpsc::UnboundedSender<Result<Vec<V>>>,
}

impl<V> BatchSender<V> {
    /// Push one batch.
    ///
    /// # Errors
    /// Returns `Error::Cancelled` if the engine is no longer listening.
    pub fn send(&self, batch: Vec<V>) -> Result<()> {
        self.sender
            .unbounded_send(Ok(batch))
            .map_err(|_| Error::Cancelled)
    }

    /// Push a single value as a batch of one.
    ///
    /// # Errors
    /// Returns `Error::Cancelled` if the engine is no longer listening.
    pub fn send_one(&self, value: V) -> Result<()> {
        self.send(vec![value])
    }

    /// Report an upstream failure. The engine forwards it and terminates.
    ///
    /// # Errors
    /// Returns `Error::Cancelled` if the engine is no longer listening.
    pub fn fail(&self, error: Error) -> Result<()> {
        self.sender
            .unbounded_send(Err(error))
            .map_err(|_| Error::Cancelled)
    }

    /// Complete the source for every clone of this sender.
    pub fn close(&self) {
        self.sender.close_channel();
    }
}

impl<V> Clone for BatchSender<V> {
    fn clone(&self) -> Self {
        BatchSender {
            sender: self.sender.clone(),
        }
    }
}
