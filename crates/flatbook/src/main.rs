use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flatbook::{router, AppState, ServerConfig};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Flattens JSON webhooks into append-only datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server
    Serve(ServeArgs),
    /// Run one payload file through the ingest path and print the receipt
    Ingest(IngestArgs),
    /// Print the current manifest
    Manifest,
    /// Write the current dataset as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Listen address, overrides FLATBOOK_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// JSON payload file
    file: PathBuf,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Destination file
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env().context("invalid configuration")?;
    let state = AppState::from_config(&config).await?;

    match cli.command {
        Command::Serve(args) => {
            let bind = args.bind.unwrap_or(config.bind);
            let listener = TcpListener::bind(&bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(
                address = %listener.local_addr()?,
                dataset = %config.settings.dataset_name,
                store = config.store.name(),
                "listening"
            );
            axum::serve(listener, router(state))
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;
            Ok(())
        }
        Command::Ingest(args) => {
            let body = tokio::fs::read(&args.file)
                .await
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let receipt = state.service.ingest(&body).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
            Ok(())
        }
        Command::Manifest => {
            let manifest = state.service.store().load_manifest().await?;
            println!("{}", String::from_utf8_lossy(&manifest.to_vec()?));
            Ok(())
        }
        Command::Export(args) => {
            let csv = state.export_csv().await?;
            tokio::fs::write(&args.output, csv)
                .await
                .with_context(|| format!("failed to write {}", args.output.display()))?;
            info!(output = %args.output.display(), "dataset exported");
            Ok(())
        }
    }
}
