//! pairlink server
//!
//! Serves the streamer/viewer pages and relays their signaling messages on a
//! single port.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:3000, pages from the current directory
//! pairlink
//!
//! # Custom port and page directory
//! PORT=8080 pairlink --root ./public
//!
//! # Print a sample config file
//! pairlink --print-config > ~/.config/pairlink/config.toml
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pairlink_core::Config;
use pairlink_signal::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(about = "Two-party WebRTC signaling relay and page server")]
#[command(version)]
struct Args {
    /// Port to listen on (default 3000)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (default 0.0.0.0, all interfaces)
    #[arg(short, long, env = "PAIRLINK_BIND")]
    bind: Option<IpAddr>,

    /// Directory the pages are served from (default: current directory)
    #[arg(short, long, env = "PAIRLINK_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(root) = args.root {
        config.server.asset_root = root;
    }

    let addr = config.listen_addr();

    info!("Starting pairlink server");
    info!("Serving pages from {:?}", config.server.asset_root);
    info!("Server running on {}", addr);
    info!("Access from any device on your network:");
    info!("Streamer: http://YOUR_IP:{}/streamer.html", addr.port());
    info!("Viewer: http://YOUR_IP:{}/viewer.html", addr.port());

    let server = RelayServer::new(&config);
    server.serve(addr).await?;

    Ok(())
}
