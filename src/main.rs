use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rtcmesh::mesh::{generate_identity, LogSinkFactory, MeshClient, SilentCapture, WebRtcEngine};
use rtcmesh::Config;

#[derive(Parser)]
#[command(name = "rtcmesh")]
#[command(about = "Full-mesh WebRTC peering over a relay signaling server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the signaling server and join a channel
    Join {
        /// Channel to join (defaults to the configured channel)
        #[arg(long)]
        channel: Option<String>,
        /// Signaling server address (overrides config)
        #[arg(long)]
        server: Option<String>,
    },
    /// Print a freshly generated session identity
    Identity,
    /// Write the default config file and print its location
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtcmesh=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Join { channel, server } => {
            let mut config = Config::load()?;
            if let Some(channel) = channel {
                config.default_channel = channel;
            }
            if let Some(server) = server {
                config.signaling_server = server;
            }

            let engine = Arc::new(WebRtcEngine::new(config.ice_servers.clone()));
            let mut client = MeshClient::new(
                config,
                engine,
                Arc::new(SilentCapture),
                Arc::new(LogSinkFactory),
            );

            let shutdown = client.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown.send(true);
                }
            });

            client.run().await?;
        }
        Commands::Identity => {
            println!("{}", generate_identity());
        }
        Commands::Init => {
            let config = Config::default();
            config.save()?;
            println!("{}", rtcmesh::config::get_config_path().display());
        }
    }

    Ok(())
}
