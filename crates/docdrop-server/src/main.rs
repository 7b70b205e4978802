#![warn(missing_docs)]

//! `docdrop` binary entry point.

use anyhow::Result;
use clap::Parser;
use docdrop_server::cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("docdrop {} starting...", env!("CARGO_PKG_VERSION"));

    Cli::parse().run().await
}
