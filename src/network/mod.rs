//! Network Layer: TCP fan-out of a shared buffer
//!
//! Features:
//! - Thread per client, each with its own cursor
//! - Clients pick their start offset with a one-line request
//! - Shutdown through a cancel token releases every blocked client
//!
//! Request format: a single ASCII line holding the decimal start offset
//! (an empty line means 0). The server answers with the raw buffer bytes from
//! that offset and shuts down its write half once the buffer is closed and
//! drained.

mod client;
mod connection;
mod server;

pub use client::connect;
pub use server::TailServer;
