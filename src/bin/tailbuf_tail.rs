//! tailbuf_tail - follow a tailbuf_run server
//!
//! Connects, asks for the output from `--offset`, and copies it to stdout
//! until the producer closes the stream.
//!
//! Usage:
//!   cargo run --release --bin tailbuf_tail -- --host 127.0.0.1:9999 --offset 0

use std::io;
use std::process;

use clap::Parser;
use tracing::{error, info};

use tailbuf::{logging, network};

#[derive(Parser, Debug)]
#[command(name = "tailbuf_tail")]
#[command(about = "Tail the output served by tailbuf_run", long_about = None)]
struct Args {
    /// Server address
    #[arg(long, default_value = "127.0.0.1:9999")]
    host: String,

    /// Byte offset to start from
    #[arg(short, long, default_value_t = 0)]
    offset: usize,
}

fn run(args: &Args) -> io::Result<u64> {
    let mut stream = network::connect(&args.host, args.offset)?;
    let copied = io::copy(&mut stream, &mut io::stdout().lock())?;
    info!(host = %args.host, bytes = copied, "stream ended");
    Ok(copied)
}

fn main() {
    logging::init_stderr();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        error!(host = %args.host, error = %e, "tail failed");
        eprintln!("tailbuf_tail: {e}");
        process::exit(1);
    }
}
