/// Keyline server binary
///
/// Serves every database under one root directory to remote clients.

use std::path::PathBuf;

use clap::Parser;
use keyline_server::Server;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keyline-server")]
#[command(about = "Keyline database server", long_about = None)]
struct Args {
    /// Top-level database directory
    #[arg(short, long, default_value = "databases", value_name = "PATH")]
    root: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8501")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to info level, override with RUST_LOG.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();

    let listener = TcpListener::bind(&args.listen).await?;
    info!(root = %args.root.display(), addr = %listener.local_addr()?, "listening");

    let server = Server::new(args.root);
    server.serve(listener).await?;
    Ok(())
}
