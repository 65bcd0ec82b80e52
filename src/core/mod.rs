//! Core module: append-only output buffer with independent cursors
//!
//! Design:
//! - Single producer: one handle appends, nothing is ever rewritten
//! - Many readers: every cursor keeps its own offset and can replay history
//! - Short critical sections: the lock covers the append or the copy, never a wait
//! - Generation-scoped wakeups: waiters sleep until the generation they saw moves on

mod cancel;
mod cursor;
mod shared_buffer;

pub use cancel::CancelToken;
pub use cursor::{Chunk, Cursor};
pub use shared_buffer::SharedBuffer;
