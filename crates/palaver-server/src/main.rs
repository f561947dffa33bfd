//! Palaver server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (33333)
//! palaver-server
//!
//! # Listen on a specific address and port
//! palaver-server --bind 127.0.0.1 --port 4000
//! ```

use clap::Parser;
use palaver_server::{DEFAULT_PORT, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Palaver chat server
#[derive(Parser, Debug)]
#[command(name = "palaver-server")]
#[command(about = "Readiness-driven TCP chat fan-out server")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ServerConfig {
        bind_address: format!("{}:{}", args.bind, args.port),
        ..Default::default()
    };

    tracing::info!("starting on port {}", args.port);

    let server = Server::bind(config)?;

    tracing::info!("listening for connections on {}", server.local_addr()?);

    server.run();
}
