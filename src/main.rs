mod cache;
mod cli;
mod config;
mod dashboard;
mod error;
mod output;
mod providers;
mod web;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {e}");
        }
    }
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting jenkins-dash");
    cli.execute().await?;
    debug!("jenkins-dash finished");

    Ok(())
}
