//! Tail server: accept loop handing each client its own cursor
//!
//! Accepting is non-blocking and polled so the loop notices the shutdown
//! token promptly. Client threads read through child tokens of the shutdown
//! token, so firing it releases clients blocked on an idle buffer too.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use super::connection::ClientHandler;
use crate::config::ServerConfig;
use crate::core::{CancelToken, SharedBuffer};

/// TCP fan-out for one shared buffer
pub struct TailServer {
    listener: TcpListener,
    config: ServerConfig,
    buffer: SharedBuffer,
    shutdown: CancelToken,
}

impl TailServer {
    /// Binds `config.bind_addr`. Nothing is accepted until [`run`](Self::run).
    pub fn bind(
        config: ServerConfig,
        buffer: SharedBuffer,
        shutdown: CancelToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)?;
        listener.set_nonblocking(true)?;
        info!(addr = %listener.local_addr()?, buffer_id = buffer.id(), "tail server listening");

        Ok(Self {
            listener,
            config,
            buffer,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until the shutdown token fires.
    ///
    /// Clients still streaming when the loop ends are left to finish on
    /// their own threads; their cursors see the cancellation. Accept errors
    /// such as running out of descriptors are logged and retried; only a
    /// listener that is no longer listening ends the loop with an error.
    pub fn run(self) -> io::Result<()> {
        self.accept_loop(TcpListener::accept)
    }

    fn accept_loop<F>(&self, mut accept: F) -> io::Result<()>
    where
        F: FnMut(&TcpListener) -> io::Result<(TcpStream, SocketAddr)>,
    {
        let mut clients: Vec<JoinHandle<()>> = Vec::new();
        let mut next_client_id = 0u64;

        while !self.shutdown.is_cancelled() {
            match accept(&self.listener) {
                Ok((stream, addr)) => {
                    let id = next_client_id;
                    next_client_id += 1;

                    match ClientHandler::new(id, stream, addr) {
                        Ok(handler) => match self.spawn_client(id, handler) {
                            Ok(client) => clients.push(client),
                            Err(e) => warn!(client_id = id, error = %e, "failed to spawn client thread"),
                        },
                        Err(e) => warn!(client_id = id, %addr, error = %e, "failed to set up client"),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.accept_poll);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                    // EINVAL: the socket is not listening anymore
                    warn!(error = %e, "listener failed");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed, retrying");
                    thread::sleep(self.config.accept_poll);
                }
            }

            clients.retain(|client| !client.is_finished());
        }

        info!(active_clients = clients.len(), "tail server stopped");
        Ok(())
    }

    fn spawn_client(&self, id: u64, handler: ClientHandler) -> io::Result<JoinHandle<()>> {
        let buffer = self.buffer.clone();
        let token = self.shutdown.child_token();
        let config = self.config.clone();

        thread::Builder::new()
            .name(format!("tailbuf-client-{id}"))
            .spawn(move || {
                if let Err(e) = handler.serve(&buffer, token, &config) {
                    warn!(client_id = id, error = %e, "client dropped");
                }
            })
    }
}
