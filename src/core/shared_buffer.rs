//! Append-only output buffer (producer side)
//!
//! One writer appends, any number of [`Cursor`]s read. All state lives behind
//! a single mutex that is only held for the append or the copy; waiting
//! happens on a condvar paired with a generation counter that is bumped on
//! every write and on close.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, debug_span, Span};

use super::cancel::{CancelToken, Waker};
use super::cursor::Cursor;
use crate::config::BufferConfig;
use crate::error::{Error, Result};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// State guarded by [`Shared::state`]
pub(crate) struct State {
    /// Everything written so far. Only ever appended to.
    pub(crate) output: Vec<u8>,
    pub(crate) closed: bool,
    /// Bumped on every write and on close
    pub(crate) generation: u64,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    pub(crate) notify: Condvar,
    pub(crate) id: u64,
    pub(crate) span: Span,
    preview_len: usize,
}

impl Shared {
    /// Each update is a single append or flag flip, so a panic while the lock
    /// was held cannot leave the state half-written.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Waker for Shared {
    fn wake(&self) {
        // Taking the lock orders this wakeup after any waiter that already
        // checked its token but has not parked yet.
        let _state = self.lock();
        self.notify.notify_all();
    }
}

/// Producer handle to a shared output buffer
///
/// Clones are handles to the same buffer. The buffer is freed once the last
/// handle and the last cursor are dropped.
#[derive(Clone)]
pub struct SharedBuffer {
    shared: Arc<Shared>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::with_config(BufferConfig::default())
    }

    pub fn with_config(config: BufferConfig) -> Self {
        let id = NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed);
        let span = debug_span!(
            "shared_buffer",
            buffer_id = id,
            label = config.label.as_deref()
        );
        span.in_scope(|| debug!("created"));

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    output: Vec::with_capacity(config.initial_capacity),
                    closed: false,
                    generation: 0,
                }),
                notify: Condvar::new(),
                id,
                span,
                preview_len: config.preview_len,
            }),
        }
    }

    /// Appends `bytes` and wakes every blocked cursor.
    ///
    /// Returns `bytes.len()`, or [`Error::Closed`] without appending anything
    /// once the buffer has been closed.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let _span = self.shared.span.enter();
        debug!(
            write_length = bytes.len(),
            write_preview = %String::from_utf8_lossy(&bytes[..bytes.len().min(self.shared.preview_len)]),
            "write"
        );

        let mut state = self.shared.lock();
        if state.closed {
            return Err(Error::Closed);
        }

        state.output.extend_from_slice(bytes);
        state.generation = state.generation.wrapping_add(1);
        self.shared.notify.notify_all();

        Ok(bytes.len())
    }

    /// Marks the stream finished and releases every blocked cursor.
    ///
    /// Not idempotent: a second call returns [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let _span = self.shared.span.enter();
        debug!("close");

        let mut state = self.shared.lock();
        if state.closed {
            return Err(Error::Closed);
        }

        state.closed = true;
        state.generation = state.generation.wrapping_add(1);
        self.shared.notify.notify_all();

        Ok(())
    }

    /// Creates a cursor starting at byte offset `start`.
    ///
    /// Safe to call from any number of threads. Blocking reads on the
    /// returned cursor are aborted when `token` fires.
    ///
    /// `start` may lie past the current length. The cursor then reports
    /// that offset from [`Cursor::position`] right away, ahead of
    /// [`len`](Self::len), and its reads wait until the buffer grows past
    /// it (or return end-of-stream if the buffer closes first).
    pub fn new_reader(&self, token: CancelToken, start: usize) -> Cursor {
        Cursor::new(Arc::clone(&self.shared), token, start)
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.shared.lock().output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Process-wide id used to correlate diagnostics
    pub fn id(&self) -> u64 {
        self.shared.id
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("SharedBuffer")
            .field("id", &self.shared.id)
            .field("len", &state.output.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl io::Write for &SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(SharedBuffer::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(SharedBuffer::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
