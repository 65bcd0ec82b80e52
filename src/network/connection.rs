//! Per-client handling: parse the request line, then stream from a cursor

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::core::{CancelToken, SharedBuffer};
use crate::error::Error;

/// Longest accepted request line, newline included
pub(crate) const MAX_REQUEST_LEN: u64 = 32;

/// Parses the client's request line into a start offset
pub(crate) fn parse_request(line: &[u8]) -> io::Result<usize> {
    let text = std::str::from_utf8(line)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .trim();

    if text.is_empty() {
        return Ok(0);
    }

    text.parse::<usize>().map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad start offset {text:?}: {e}"),
        )
    })
}

/// One connected client
pub(crate) struct ClientHandler {
    id: u64,
    stream: TcpStream,
    addr: SocketAddr,
    bytes_sent: u64,
}

impl ClientHandler {
    pub(crate) fn new(id: u64, stream: TcpStream, addr: SocketAddr) -> io::Result<Self> {
        // Accepted from a non-blocking listener; this side blocks
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            id,
            stream,
            addr,
            bytes_sent: 0,
        })
    }

    fn read_request(&mut self, config: &ServerConfig) -> io::Result<usize> {
        self.stream.set_read_timeout(Some(config.request_timeout))?;

        let mut line = Vec::with_capacity(MAX_REQUEST_LEN as usize);
        BufReader::new((&self.stream).take(MAX_REQUEST_LEN)).read_until(b'\n', &mut line)?;
        if line.len() as u64 == MAX_REQUEST_LEN && !line.ends_with(b"\n") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "request line too long",
            ));
        }

        self.stream.set_read_timeout(None)?;
        parse_request(&line)
    }

    /// Streams the buffer to the client until end-of-stream or cancellation.
    ///
    /// Returns the number of bytes sent.
    pub(crate) fn serve(
        mut self,
        buffer: &SharedBuffer,
        token: CancelToken,
        config: &ServerConfig,
    ) -> io::Result<u64> {
        let start = self.read_request(config)?;
        let mut cursor = buffer.new_reader(token, start);
        info!(
            client_id = self.id,
            addr = %self.addr,
            reader_id = cursor.id(),
            start,
            "client subscribed"
        );

        let mut chunk = vec![0u8; config.chunk_size.max(1)];
        loop {
            match cursor.read_chunk(&mut chunk) {
                Ok(read) => {
                    self.stream.write_all(&chunk[..read.len])?;
                    self.bytes_sent += read.len as u64;
                    if read.end_of_stream {
                        break;
                    }
                }
                Err(Error::Cancelled(cause)) => {
                    debug!(client_id = self.id, %cause, "client released");
                    return Ok(self.bytes_sent);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.stream.shutdown(Shutdown::Write)?;
        info!(
            client_id = self.id,
            bytes_sent = self.bytes_sent,
            "client drained"
        );
        Ok(self.bytes_sent)
    }
}
