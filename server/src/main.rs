use clap::Parser;
use log::{error, info};
use server::leaderboard::{self, Leaderboard};
use server::network::Server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, then starts the relay server and the
/// leaderboard page.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Game port to listen on
        #[clap(short, long, default_value = "5555")]
        port: u16,
        /// Tick rate (simulation updates per second)
        #[clap(short, long, default_value = "60")]
        tick_rate: u32,
        /// Port for the leaderboard web page
        #[clap(long, default_value = "8081")]
        http_port: u16,
        /// File the leaderboard persists to (in-memory only if omitted)
        #[clap(long)]
        leaderboard_file: Option<PathBuf>,
    }

    env_logger::init();
    let args = Args::parse();

    let leaderboard = Arc::new(Leaderboard::with_persistence(args.leaderboard_file.clone()));

    let tick_rate = args.tick_rate.max(1);
    let tick_duration = Duration::from_secs_f32(1.0 / tick_rate as f32);
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, tick_duration, Arc::clone(&leaderboard)).await?;

    // The page runs on its own task; losing it never takes the game down.
    let http_address = format!("{}:{}", args.host, args.http_port);
    let http_handle = {
        let leaderboard = Arc::clone(&leaderboard);
        tokio::spawn(async move {
            if let Err(e) = leaderboard::serve(leaderboard, &http_address).await {
                error!("leaderboard page unavailable: {}", e);
            }
        })
    };

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("server stopped: {}", e);
            }
        }
        result = http_handle => {
            if let Err(e) = result {
                error!("leaderboard task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
