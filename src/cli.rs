use std::net::SocketAddr;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address the server should bind to. Use port 0 for an
    /// ephemeral port.
    #[arg(long, default_value = "127.0.0.1:4000")]
    pub listen: SocketAddr,

    /// Longest accepted command line, in bytes. Longer lines are rejected
    /// with a protocol error.
    #[arg(long, default_value_t = crate::server::DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,
}
