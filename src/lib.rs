//! tailbuf - capture streaming output once, tail it from anywhere
//!
//! Layout:
//! - [`core`]: the shared append-only buffer, its cursors and cancel tokens
//! - [`capture`]: pumps a child process's stdout/stderr into a buffer
//! - [`network`]: TCP fan-out, one cursor per connected client
//! - [`logging`]: `tracing` subscriber setup for the binaries and tests
//!
//! ```
//! use tailbuf::{CancelToken, SharedBuffer};
//!
//! let buffer = SharedBuffer::new();
//! buffer.write(b"hello ").unwrap();
//!
//! let mut cursor = buffer.new_reader(CancelToken::new(), 0);
//! buffer.write(b"world").unwrap();
//! buffer.close().unwrap();
//!
//! let mut out = [0u8; 32];
//! let chunk = cursor.read_chunk(&mut out).unwrap();
//! assert_eq!(&out[..chunk.len], b"hello world");
//! assert!(chunk.end_of_stream);
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod network;

pub use crate::config::{BufferConfig, ServerConfig};
pub use crate::core::{CancelToken, Chunk, Cursor, SharedBuffer};
pub use crate::error::{CancelCause, Error, Result};
