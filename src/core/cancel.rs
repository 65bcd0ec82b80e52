//! Cooperative cancellation for blocking reads
//!
//! A [`CancelToken`] is owned by the caller and passed into
//! [`SharedBuffer::new_reader`](super::SharedBuffer::new_reader). While a
//! cursor is blocked it registers its buffer as a waker on the token; firing
//! the token records the cause first and then pokes every registered waker,
//! so a cursor can never miss a cancellation between checking the token and
//! going to sleep.

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::error::CancelCause;

/// Something a token pokes when it fires
pub(crate) trait Waker: Send + Sync {
    fn wake(&self);
}

/// Cloneable cancellation handle
///
/// Clones share state: cancelling any clone cancels all of them.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    deadline: Option<Instant>,
    state: Mutex<TokenState>,
}

#[derive(Default)]
struct TokenState {
    cause: Option<CancelCause>,
    next_waker_id: u64,
    wakers: Vec<(u64, Arc<dyn Waker>)>,
    children: Vec<Weak<Inner>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            state: Mutex::new(TokenState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current cause, recording an expired deadline as it is noticed.
    ///
    /// Deadline expiry wakes nobody: every waiter sleeps with a timeout
    /// bounded by the same deadline and notices it on its own.
    fn cause(&self) -> Option<CancelCause> {
        let mut state = self.lock();
        if state.cause.is_none() {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    state.cause = Some(CancelCause::DeadlineExceeded);
                }
            }
        }
        state.cause
    }

    fn fire(&self, cause: CancelCause) {
        let (wakers, children) = {
            let mut state = self.lock();
            if state.cause.is_some() {
                return;
            }
            state.cause = Some(cause);
            (
                mem::take(&mut state.wakers),
                mem::take(&mut state.children),
            )
        };

        // Token lock is released here; wakers take their own locks
        for (_, waker) in wakers {
            waker.wake();
        }
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(cause);
        }
    }
}

impl CancelToken {
    /// Token that only fires on [`cancel`](Self::cancel)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Token that fires with [`CancelCause::DeadlineExceeded`] at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(Inner::new(Some(deadline))),
        }
    }

    /// Token that fires with [`CancelCause::DeadlineExceeded`] after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Creates a token that fires when this one does, or when cancelled on
    /// its own. Cancelling the child leaves the parent untouched.
    pub fn child_token(&self) -> CancelToken {
        let child = Arc::new(Inner::new(self.inner.deadline));

        {
            let mut state = self.inner.lock();
            match state.cause {
                Some(cause) => child.lock().cause = Some(cause),
                None => {
                    state.children.retain(|c| c.strong_count() > 0);
                    state.children.push(Arc::downgrade(&child));
                }
            }
        }

        CancelToken { inner: child }
    }

    /// Fires the token with [`CancelCause::Cancelled`]. Only the first cause
    /// sticks; later calls are no-ops.
    pub fn cancel(&self) {
        self.inner.fire(CancelCause::Cancelled);
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.inner.cause()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Registers `waker` to be poked when the token fires.
    ///
    /// Fails with the cause if the token has already fired, in the same
    /// critical section as the registration.
    pub(crate) fn register(&self, waker: Arc<dyn Waker>) -> Result<Registration, CancelCause> {
        if let Some(cause) = self.inner.cause() {
            return Err(cause);
        }

        let mut state = self.inner.lock();
        if let Some(cause) = state.cause {
            return Err(cause);
        }
        let id = state.next_waker_id;
        state.next_waker_id += 1;
        state.wakers.push((id, waker));

        Ok(Registration {
            inner: Arc::clone(&self.inner),
            id,
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cause", &self.inner.lock().cause)
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

/// Removes a waker from its token when dropped
pub(crate) struct Registration {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let id = self.id;
        self.inner.lock().wakers.retain(|(waker_id, _)| *waker_id != id);
    }
}
