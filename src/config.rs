//! Configuration for buffers and the tail server

use std::time::Duration;

/// Default number of bytes of each write included in its debug event
pub const DEFAULT_PREVIEW_LEN: usize = 30;

/// Buffer configuration
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Max bytes of a write echoed in the `write` debug event
    pub preview_len: usize,
    /// Bytes reserved up front for the output
    pub initial_capacity: usize,
    /// Optional name attached to the buffer's span (e.g. a job id)
    pub label: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            preview_len: DEFAULT_PREVIEW_LEN,
            initial_capacity: 0,
            label: None,
        }
    }
}

impl BufferConfig {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Tail server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Size of the per-client copy buffer
    pub chunk_size: usize,
    /// How long a client has to send its request line
    pub request_timeout: Duration,
    /// Sleep between non-blocking accept attempts
    pub accept_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9999".to_string(),
            chunk_size: 64 * 1024,
            request_timeout: Duration::from_secs(2),
            accept_poll: Duration::from_millis(10),
        }
    }
}
