use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;

use salond::booking::BookingReconciler;
use salond::db::Database;
use salond::{jobs, server};

#[derive(Parser)]
#[command(name = "salond")]
#[command(about = "AI Phone Receptionist Booking Engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Database file path
        #[arg(long, default_value = "./salond.db")]
        db: String,
        /// Public server URL (for calendar webhook callbacks)
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },
    /// Renew expiring calendar webhook channels (cron entrypoint)
    RenewChannels {
        /// Database file path
        #[arg(long, default_value = "./salond.db")]
        db: String,
        /// Public server URL (for calendar webhook callbacks)
        #[arg(long, default_value = "http://localhost:8080")]
        url: String,
    },
    /// Retry calendar sync for unsynced bookings (cron entrypoint)
    Resync {
        /// Database file path
        #[arg(long, default_value = "./salond.db")]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("salond=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, db, url } => {
            let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
            server::run_server(addr, &db, &url).await?;
        }
        Commands::RenewChannels { db, url } => {
            let db = Database::open(&db)?;
            let calendar = server::calendar_from_env()?;
            let report = jobs::renew_channels(&db, &calendar, &url).await?;
            println!("renewed {}/{} channels", report.renewed, report.total);
        }
        Commands::Resync { db } => {
            let db = Database::open(&db)?;
            let calendar = server::calendar_from_env()?;
            let reconciler = BookingReconciler::new(&db, &calendar);
            let synced = reconciler.retry_unsynced().await?;
            println!("synced {} bookings", synced);
        }
    }

    Ok(())
}
