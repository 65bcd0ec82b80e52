//! Client side of the tail protocol

use std::io::{self, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

/// Connects to a tail server and requests the stream from `offset`.
///
/// The returned stream yields the buffer's bytes and reaches end of file once
/// the buffer is closed and drained.
pub fn connect<A: ToSocketAddrs>(addr: A, offset: usize) -> io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    writeln!(stream, "{offset}")?;
    // Nothing more to send
    stream.shutdown(Shutdown::Write)?;
    Ok(stream)
}
