//! Error types for the shared buffer and its cursors
//!
//! End-of-stream is not an error: it travels in [`crate::core::Chunk`].

use std::io;

/// Why a blocked read was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelCause {
    /// The token (or one of its ancestors) was cancelled explicitly
    #[error("cancelled")]
    Cancelled,
    /// The token's deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors surfaced by [`crate::core::SharedBuffer`] and [`crate::core::Cursor`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Write after close, or a second close
    #[error("shared buffer is closed")]
    Closed,
    /// A blocked read was aborted by its cancel token
    #[error("read cancelled: {0}")]
    Cancelled(CancelCause),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::Cancelled(CancelCause::DeadlineExceeded) => io::ErrorKind::TimedOut,
            Error::Cancelled(CancelCause::Cancelled) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
