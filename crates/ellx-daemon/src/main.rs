//! Ellx Daemon - Main entry point
//!
//! Serves one directory to the trusted remote client until interrupted.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ellx_daemon::{events, DaemonConfig, ServerHandle};

#[derive(Parser, Debug)]
#[command(name = "ellx-daemon")]
#[command(about = "Serve a directory to the Ellx web client")]
#[command(version)]
struct Args {
    /// JSON config file
    #[arg(short, long, env = "ELLX_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to serve (a file:// URI is accepted)
    #[arg(short, long)]
    root: Option<String>,

    /// Client user name
    #[arg(short, long)]
    user: Option<String>,

    /// Server identity (defaults to the root directory name)
    #[arg(short, long)]
    identity: Option<String>,

    /// URL of the trust certificate
    #[arg(short, long)]
    trust: Option<String>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Read editor events as JSON lines from stdin
    #[arg(long)]
    events_stdin: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) if path.exists() => DaemonConfig::load(path)?,
            _ => DaemonConfig::default(),
        };

        if let Some(root) = &self.root {
            config.set_root(root);
        }
        if let Some(user) = self.user {
            config.user = user;
        }
        if let Some(identity) = self.identity {
            config.identity = Some(identity);
        }
        if let Some(trust) = self.trust {
            config.trust_url = trust;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose {
        "ellx_daemon=debug,tower_http=debug"
    } else {
        "ellx_daemon=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ellx daemon v{}", env!("CARGO_PKG_VERSION"));

    let events_stdin = args.events_stdin;
    let config = args.into_config()?;
    let server = ServerHandle::start(config).await?;

    if events_stdin {
        let registry = server.registry();
        tokio::spawn(async move {
            match events::pump_lines(tokio::io::stdin(), &registry).await {
                Ok(count) => info!("Editor event stream ended after {} events", count),
                Err(e) => error!("Editor event stream failed: {}", e),
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    server.stop().await?;
    info!("Daemon stopped");

    Ok(())
}
