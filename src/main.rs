//! Remoting server binary.
//!
//! Loads configuration, starts one server with the built-in `echo` invoker
//! and runs until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use remoting_server::config::loader::load_config;
use remoting_server::config::RemotingConfig;
use remoting_server::observability::{logging, metrics};
use remoting_server::{FnMethodInvoker, RemotingServer};

#[derive(Debug, Parser)]
#[command(name = "remoting-server", version, about = "RPC transport server")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured listen port.
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => RemotingConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.listen_port = port;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("remoting-server v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        server = %config.server.server_name,
        listen_port = config.server.listen_port,
        worker_threads = config.server.worker_threads,
        idle_millis = config.server.connection_idle_time_millis,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = RemotingServer::new(config.server)?;
    server.register_method_invoker(Arc::new(FnMethodInvoker::new("echo", |args| Ok(args))));
    server.start()?;

    // Signal handling needs a reactor of its own; the server's groups are private.
    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    signals.block_on(tokio::signal::ctrl_c())?;
    tracing::info!("Shutdown signal received");

    server.close();
    tracing::info!("Shutdown complete");
    Ok(())
}
