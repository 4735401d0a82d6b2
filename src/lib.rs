//! WasteWatch - report illegal waste dumping with a video.
//!
//! This is the main library crate for the WasteWatch reporter.
//! It provides the capture controller, the report form around it, and
//! the command line entry point.

pub mod capture;
pub mod cli;
pub mod config;
pub mod media;
pub mod recorder;
pub mod report;
pub mod utils;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utils::error::ErrorResponse;

/// Initialize logging on stderr, leaving stdout for the receipt
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wastewatch_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run the command line application
pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    init_tracing();

    tracing::info!("Starting WasteWatch v{}", env!("CARGO_PKG_VERSION"));

    match cli::execute(cli).await {
        Ok(receipt) => {
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Err(e) => {
            let error = anyhow::Error::new(e);
            let response = ErrorResponse::from(&error);
            println!("{}", serde_json::to_string_pretty(&response)?);
            Err(error)
        }
    }
}
