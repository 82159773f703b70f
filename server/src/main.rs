use clap::Parser;
use log::{error, info};
use server::config::{
    ServerConfig, DEFAULT_HUB_CAPACITY, DEFAULT_OUTBOUND_CAPACITY, DEFAULT_SNAPSHOT_RATE,
    DEFAULT_TICK_RATE,
};
use server::game::Game;
use server::hub::SessionHub;
use server::network::NetworkServer;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, then starts the hub, the game engine and the listener.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, env = "GAME_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, env = "GAME_PORT", default_value = "8080")]
        port: u16,
        /// Simulation ticks per second
        #[clap(short, long, default_value_t = DEFAULT_TICK_RATE)]
        tick_rate: u32,
        /// State snapshots sent per second
        #[clap(short = 'b', long, default_value_t = DEFAULT_SNAPSHOT_RATE)]
        snapshot_rate: u32,
        /// Frames a client may have queued before it is dropped
        #[clap(long, default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
        outbound_capacity: usize,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_rate: args.tick_rate,
        snapshot_rate: args.snapshot_rate,
        outbound_capacity: args.outbound_capacity,
        hub_capacity: DEFAULT_HUB_CAPACITY,
    };

    info!(
        "Game server starting on {} ({} ticks/s, {} snapshots/s)",
        config.bind_addr, config.tick_rate, config.snapshot_rate
    );

    let game = Arc::new(Game::new(&config));
    let (hub, hub_handle) = SessionHub::start(game, &config);
    let server = NetworkServer::bind(&config.bind_addr, hub.clone()).await?;

    // Handle shutdown gracefully
    tokio::select! {
        _ = server.run() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down server...");
        }
    }

    hub.shutdown().await;
    if let Err(e) = hub_handle.await {
        error!("Hub task panicked: {}", e);
    }

    info!("Server stopped");
    Ok(())
}
