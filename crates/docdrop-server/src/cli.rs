use crate::api::DocApi;
use crate::config::ServerConfig;
use crate::service::DocService;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docdrop_convert::{ConverterRegistry, DocumentConverter};
use docdrop_store::{BlobStore, RetentionSweeper};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "docdrop", version)]
#[command(about = "Temporary document drop with on-demand HTML conversion", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, env = "DOCDROP_CONFIG", default_value = "docdrop.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service and the retention sweeper.
    Serve(Overrides),
    /// Run one retention sweep over the upload directory and exit.
    Sweep(Overrides),
    /// Convert a local document to HTML on stdout.
    Convert { file: PathBuf },
}

/// Command-line and environment overrides for the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    #[arg(long, env = "DOCDROP_BIND")]
    pub bind: Option<SocketAddr>,

    #[arg(long, env = "DOCDROP_PUBLIC_URL")]
    pub public_url: Option<String>,

    #[arg(long, env = "DOCDROP_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    #[arg(long, env = "DOCDROP_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    #[arg(long, env = "DOCDROP_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<u64>,

    #[arg(long, env = "DOCDROP_TTL_SECS")]
    pub ttl_secs: Option<u64>,

    #[arg(long, env = "DOCDROP_SWEEP_INTERVAL_SECS")]
    pub sweep_interval_secs: Option<u64>,

    #[arg(long, env = "DOCDROP_CONVERT_TIMEOUT_SECS")]
    pub convert_timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(url) = &self.public_url {
            config.public_url = Some(url.clone());
        }
        if let Some(dir) = &self.upload_dir {
            config.upload_dir = dir.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = dir.clone();
        }
        if let Some(bytes) = self.max_upload_bytes {
            config.max_upload_bytes = bytes;
        }
        if let Some(secs) = self.ttl_secs {
            config.ttl_secs = secs;
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.sweep_interval_secs = secs;
        }
        if let Some(secs) = self.convert_timeout_secs {
            config.convert_timeout_secs = secs;
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve(ref overrides) => {
                let config = self.load_config(overrides)?;
                serve(config).await
            }
            Command::Sweep(ref overrides) => {
                let config = self.load_config(overrides)?;
                sweep_once(config).await
            }
            Command::Convert { ref file } => convert_file(file.clone()).await,
        }
    }

    fn load_config(&self, overrides: &Overrides) -> Result<ServerConfig> {
        let mut config = ServerConfig::load_or_default(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        overrides.apply(&mut config);
        Ok(config)
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let service = Arc::new(
        DocService::open(config.clone(), shutdown.child_token())
            .await
            .with_context(|| format!("opening upload directory {}", config.upload_dir.display()))?,
    );

    let store_config = config.store_config();
    let sweeper = RetentionSweeper::new(service.store().clone(), store_config.ttl())
        .spawn(store_config.sweep_interval(), shutdown.child_token());

    let api = DocApi::new(service).with_sweeper_stats(sweeper.subscribe());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let result = api.serve(shutdown.clone()).await;
    shutdown.cancel();
    sweeper.shutdown().await;
    result
}

async fn sweep_once(config: ServerConfig) -> Result<()> {
    let store_config = config.store_config();
    let store = BlobStore::open(&store_config)
        .await
        .with_context(|| format!("opening upload directory {}", store_config.upload_dir.display()))?;

    let stats = RetentionSweeper::new(Arc::new(store), store_config.ttl())
        .sweep()
        .await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn convert_file(file: PathBuf) -> Result<()> {
    let registry = ConverterRegistry::with_defaults();
    let display = file.display().to_string();
    let conversion = tokio::task::spawn_blocking(move || registry.convert(&file))
        .await?
        .with_context(|| format!("converting {display}"))?;

    for message in &conversion.messages {
        eprintln!("warning: {message}");
    }
    println!("{}", conversion.html);
    Ok(())
}
