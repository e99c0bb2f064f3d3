//! Error taxonomy shared by the server and client binaries.
//!
//! Each variant corresponds to one row of the error table in the design
//! document: who raises it, and what the raising component does about it.
//! Propagation stays local — peers only ever learn about another peer's
//! failure indirectly, via a `clientLeft` broadcast.

use std::io;
use tokio::sync::mpsc;

/// The single error type returned by every fallible `core` operation.
#[derive(Debug, thiserror::Error)]
pub enum SvsError {
    /// Socket accept/connect/read/write failure. Closes the connection it
    /// was raised on; never propagated to other peers.
    #[error("network error: {0}")]
    NetworkError(#[from] io::Error),

    /// A frame failed to parse, or was missing required fields. The
    /// connection stays open; the frame is dropped.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The CRDT rejected a binary update. The session keeps running.
    #[error("invalid CRDT update: {0}")]
    InvalidUpdate(String),

    /// Operation referenced a fileId the registry doesn't know about.
    #[error("not found: {0}")]
    NotFound(String),

    /// A `share`/`create` call targeted a fileId that already exists.
    /// Policy is to treat this as idempotent and return the existing
    /// document rather than failing.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Local file read/write failed. Surfaced to the caller (e.g. the
    /// share-file command); never sent to peers as a fatal condition.
    #[error("io error: {0}")]
    IoError(String),

    /// A peer's write queue overflowed the back-pressure threshold. The
    /// connection is closed and a `clientLeft` is broadcast.
    #[error("slow consumer, connection closed")]
    SlowConsumer,
}

impl SvsError {
    /// True for errors that should close the connection they occurred on.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, SvsError::NetworkError(_) | SvsError::SlowConsumer)
    }

    /// Feeds this error into the error-event channel the outer UI drains.
    /// A full channel drops the event rather than blocking the caller —
    /// the channel is a diagnostic tap, not a delivery guarantee.
    pub fn to_event(self, tx: &ErrorSender) {
        let _ = tx.try_send(self);
    }
}

pub type Result<T> = std::result::Result<T, SvsError>;

/// Sending half of the error-event channel, held by `Server`/`Client` and
/// fed via [`SvsError::to_event`].
pub type ErrorSender = mpsc::Sender<SvsError>;
/// Receiving half, handed once to the outer UI layer (a binary's `main`)
/// to drain and surface however it sees fit.
pub type ErrorReceiver = mpsc::Receiver<SvsError>;

/// Creates a bounded error-event channel. `capacity` bounds how many
/// undrained events queue up before new ones are silently dropped.
pub fn error_channel(capacity: usize) -> (ErrorSender, ErrorReceiver) {
    mpsc::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn to_event_delivers_the_error_to_the_receiver() {
        let (tx, mut rx) = error_channel(4);
        SvsError::SlowConsumer.to_event(&tx);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, SvsError::SlowConsumer));
    }

    #[tokio::test]
    async fn to_event_drops_silently_once_the_channel_is_full() {
        let (tx, mut rx) = error_channel(1);
        SvsError::SlowConsumer.to_event(&tx);
        SvsError::NotFound("f1".into()).to_event(&tx);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, SvsError::SlowConsumer));
    }
}
