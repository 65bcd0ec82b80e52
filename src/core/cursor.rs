//! Independent read position into a [`SharedBuffer`](super::SharedBuffer)

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, trace, Span};

use super::cancel::{CancelToken, Registration, Waker};
use super::shared_buffer::Shared;
use crate::error::{CancelCause, Error, Result};

static NEXT_READER_ID: AtomicU64 = AtomicU64::new(0);

/// Result of a successful [`Cursor::read_chunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Bytes copied into the destination
    pub len: usize,
    /// The producer has closed and this cursor has nothing left to read.
    /// Can be set together with `len > 0` when the read drained the tail.
    pub end_of_stream: bool,
}

/// Consumer side of a shared buffer
///
/// Each cursor owns its position; cursors never affect each other or the
/// producer. A cursor is `Send` but reads take `&mut self`, so one caller
/// drives it at a time.
pub struct Cursor {
    position: usize,
    shared: Arc<Shared>,
    token: CancelToken,
    id: u64,
    span: Span,
}

impl Cursor {
    pub(crate) fn new(shared: Arc<Shared>, token: CancelToken, start: usize) -> Self {
        let id = NEXT_READER_ID.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!(parent: &shared.span, "cursor", reader_id = id);
        span.in_scope(|| debug!(start_position = start, "created"));

        Self {
            position: start,
            shared,
            token,
            id,
            span,
        }
    }

    /// Copies the next available bytes into `out`.
    ///
    /// Never blocks while at least one byte is available. Otherwise blocks
    /// until the producer writes, closes, or the cancel token fires. Bytes
    /// that drain the buffer after close come back together with
    /// `end_of_stream`. A cancelled read copies nothing and leaves the
    /// position where it was.
    ///
    /// An empty `out` never blocks.
    pub fn read_chunk(&mut self, out: &mut [u8]) -> Result<Chunk> {
        let _span = self.span.enter();
        let mut wait_iterations = 0usize;
        let mut registration: Option<Registration> = None;

        loop {
            let (copied, limit, closed, generation) = {
                let state = self.shared.lock();
                let limit = state.output.len();
                let copied = limit.saturating_sub(self.position).min(out.len());
                if copied > 0 {
                    out[..copied]
                        .copy_from_slice(&state.output[self.position..self.position + copied]);
                    self.position += copied;
                }
                (copied, limit, state.closed, state.generation)
            };

            trace!(
                position_before_read = self.position - copied,
                position_increment = copied,
                position_limit = limit,
                position_increment_limit = out.len(),
                writer_closed = closed,
                wait_iteration_count = wait_iterations,
                "read"
            );

            if closed && self.position >= limit {
                return Ok(Chunk {
                    len: copied,
                    end_of_stream: true,
                });
            }

            if copied > 0 || out.is_empty() {
                return Ok(Chunk {
                    len: copied,
                    end_of_stream: false,
                });
            }

            wait_iterations += 1;

            if let Err(cause) = self.wait_for_change(generation, &mut registration) {
                debug!(%cause, wait_iteration_count = wait_iterations, "read cancelled");
                return Err(Error::Cancelled(cause));
            }
        }
    }

    /// Sleeps until the buffer's generation moves past `seen` or the token
    /// fires. The buffer lock is released while parked.
    fn wait_for_change(
        &self,
        seen: u64,
        registration: &mut Option<Registration>,
    ) -> std::result::Result<(), CancelCause> {
        let mut state = self.shared.lock();

        while state.generation == seen {
            // Register (or re-check) with the buffer lock held, so a cancel
            // cannot slip in between the check and the wait below
            if registration.is_some() {
                if let Some(cause) = self.token.cause() {
                    return Err(cause);
                }
            } else {
                let waker: Arc<dyn Waker> = self.shared.clone();
                *registration = Some(self.token.register(waker)?);
            }

            state = match self.token.deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    self.shared
                        .notify
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
                None => self
                    .shared
                    .notify
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }

        Ok(())
    }

    /// Offset of the next byte this cursor will read
    pub fn position(&self) -> usize {
        self.position
    }

    /// Process-wide id used to correlate diagnostics
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl io::Read for Cursor {
    /// End-of-stream surfaces as `Ok(0)` on the call after the last bytes.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_chunk(buf)?.len)
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("id", &self.id)
            .field("buffer_id", &self.shared.id)
            .field("position", &self.position)
            .finish()
    }
}
