//! tailbuf_run - run a command and let any number of observers tail it
//!
//! The command's combined stdout/stderr is captured into a shared buffer,
//! mirrored to this process's stdout, and (with `--listen`) served to TCP
//! clients that may join at any time and replay from any offset.
//!
//! Usage:
//!   cargo run --release --bin tailbuf_run -- --listen 127.0.0.1:9999 -- make test

use std::io;
use std::process::{self, Command, ExitStatus};
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use tailbuf::capture::Capture;
use tailbuf::network::TailServer;
use tailbuf::{logging, BufferConfig, CancelToken, ServerConfig, SharedBuffer};

#[derive(Parser, Debug)]
#[command(name = "tailbuf_run")]
#[command(about = "Run a command and serve its output to tailing clients", long_about = None)]
struct Args {
    /// Serve the output to tail clients on this address
    #[arg(short, long)]
    listen: Option<String>,

    /// Keep serving for this many seconds after the command exits
    #[arg(long, default_value_t = 0)]
    linger: u64,

    /// Do not mirror the output to stdout
    #[arg(short, long)]
    quiet: bool,

    /// Name attached to the buffer in diagnostics (defaults to the program)
    #[arg(long)]
    label: Option<String>,

    /// Command to run, with its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn run(args: Args) -> io::Result<ExitStatus> {
    let label = args.label.clone().unwrap_or_else(|| args.command[0].clone());
    let buffer = SharedBuffer::with_config(BufferConfig::default().with_label(label));
    let shutdown = CancelToken::new();

    let server = match &args.listen {
        Some(addr) => {
            let config = ServerConfig {
                bind_addr: addr.clone(),
                ..ServerConfig::default()
            };
            let server = TailServer::bind(config, buffer.clone(), shutdown.clone())?;
            info!(addr = %server.local_addr()?, "serving output");
            Some(thread::spawn(move || server.run()))
        }
        None => None,
    };

    let mirror = if args.quiet {
        None
    } else {
        let mut cursor = buffer.new_reader(shutdown.child_token(), 0);
        Some(thread::spawn(move || {
            io::copy(&mut cursor, &mut io::stdout().lock())
        }))
    };

    let mut command = Command::new(&args.command[0]);
    command.args(&args.command[1..]);
    let status = Capture::spawn(&mut command, buffer)?.wait()?;
    info!(%status, "command finished");

    if let Some(mirror) = mirror {
        match mirror.join() {
            Ok(Ok(bytes)) => info!(bytes, "mirror drained"),
            Ok(Err(e)) => error!(error = %e, "mirror failed"),
            Err(_) => error!("mirror panicked"),
        }
    }

    if let Some(server) = server {
        thread::sleep(Duration::from_secs(args.linger));
        shutdown.cancel();
        match server.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "tail server failed"),
            Err(_) => error!("tail server panicked"),
        }
    }

    Ok(status)
}

fn main() {
    logging::init_stderr();
    let args = Args::parse();

    match run(args) {
        Ok(status) => process::exit(status.code().unwrap_or(1)),
        Err(e) => {
            error!(error = %e, "tailbuf_run failed");
            eprintln!("tailbuf_run: {e}");
            process::exit(1);
        }
    }
}
