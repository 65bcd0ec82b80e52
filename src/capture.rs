//! Child process capture
//!
//! Spawns a command with piped stdout and stderr and pumps both into one
//! [`SharedBuffer`], so the buffer holds the job's combined output. Each
//! write lands whole, so output interleaves at pipe-read granularity.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::core::SharedBuffer;

const PUMP_CHUNK_SIZE: usize = 8 * 1024;

/// A running child whose output is being captured
pub struct Capture {
    child: Child,
    pumps: Vec<JoinHandle<io::Result<u64>>>,
    buffer: SharedBuffer,
}

impl Capture {
    /// Spawns `command` with stdout and stderr piped into `buffer`.
    ///
    /// The buffer is closed by [`wait`](Self::wait), after both streams have
    /// hit end of file.
    pub fn spawn(command: &mut Command, buffer: SharedBuffer) -> io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        info!(pid = child.id(), buffer_id = buffer.id(), "capture started");

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_pump("stdout", stdout, buffer.clone())?);
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_pump("stderr", stderr, buffer.clone())?);
        }

        Ok(Self {
            child,
            pumps,
            buffer,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Kills the child. Pumps drain whatever is left in the pipes.
    pub fn kill(&mut self) -> io::Result<()> {
        warn!(pid = self.child.id(), "killing captured process");
        self.child.kill()
    }

    /// Waits for both pumps and the child, then closes the buffer.
    ///
    /// The buffer is closed even when a pump failed; the first pump error is
    /// returned after the child has been reaped.
    pub fn wait(mut self) -> io::Result<ExitStatus> {
        let mut pump_error = None;
        for pump in self.pumps.drain(..) {
            let result = pump
                .join()
                .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "pump panicked")));
            if let Err(e) = result {
                pump_error.get_or_insert(e);
            }
        }

        let status = self.child.wait();
        if let Err(e) = self.buffer.close() {
            warn!(error = %e, "captured buffer already closed");
        }

        let status = status?;
        info!(pid = self.child.id(), %status, "capture finished");
        match pump_error {
            Some(e) => Err(e),
            None => Ok(status),
        }
    }
}

fn spawn_pump<R>(
    name: &'static str,
    source: R,
    buffer: SharedBuffer,
) -> io::Result<JoinHandle<io::Result<u64>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("tailbuf-{name}"))
        .spawn(move || pump(name, source, &buffer))
}

fn pump<R: Read>(name: &str, mut source: R, buffer: &SharedBuffer) -> io::Result<u64> {
    let mut chunk = [0u8; PUMP_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        buffer.write(&chunk[..n])?;
        total += n as u64;
    }

    debug!(stream = name, bytes = total, "pump finished");
    Ok(total)
}
