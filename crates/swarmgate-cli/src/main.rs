use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use swarmgate_core::LogSink;
use swarmgate_hub::{Hub, HubConfig, HubServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swarmgate", about = "Swarmgate — agent hub and swarm orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        /// Shared auth secret; omit to disable authentication
        #[arg(long, env = "SWARMGATE_SECRET")]
        secret: Option<String>,
        /// Requests allowed per connection per minute
        #[arg(long, default_value_t = 100)]
        rate_limit: u32,
        /// Seconds between heartbeat pings
        #[arg(long, default_value_t = 30)]
        heartbeat: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            secret,
            rate_limit,
            heartbeat,
        } => {
            let auth_enabled = secret.is_some();
            let config = HubConfig {
                shared_secret: secret,
                rate_limit,
                heartbeat_interval: Duration::from_secs(heartbeat),
                ..HubConfig::default()
            };
            let hub = Hub::new(config, Arc::new(LogSink));
            let _heartbeat = hub.start_heartbeat();

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            if auth_enabled {
                info!("Shared-secret auth enabled");
            } else {
                info!("Auth disabled; connections get a generated identity");
            }
            info!("Swarmgate hub listening on {}", addr);

            HubServer::serve(hub, listener, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for shutdown signal");
                }
                info!("Shutdown signal received");
            })
            .await?;
        }
    }

    Ok(())
}
