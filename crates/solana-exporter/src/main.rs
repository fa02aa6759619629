// Numan Thabit 2025
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use solana_exporter::{
    collector::SolanaCollector,
    config::{CliArgs, ExporterConfig},
    http,
    metrics::ExporterMetrics,
    rpc::RpcClient,
    slots,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let config = ExporterConfig::from_cli(&cli)?;
    if config.no_voting {
        tracing::info!("no-voting set; this node is not a validator");
    }

    let metrics = ExporterMetrics::new()?;
    let client = Arc::new(
        RpcClient::new(config.rpc_uri.clone(), config.collect_timeout)
            .context("failed to construct rpc client")?,
    );

    let shutdown = CancellationToken::new();
    let watcher = config.watch_slots().then(|| {
        slots::spawn_slot_watcher(
            client.clone(),
            metrics.clone(),
            config.slot_interval,
            shutdown.clone(),
        )
    });

    let collector = Arc::new(SolanaCollector::new(client, config.collector()));

    let signal = shutdown.clone();
    http::serve(config.listen, collector, metrics, async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown signal received; terminating http server");
        signal.cancel();
    })
    .await?;

    shutdown.cancel();
    if let Some(handle) = watcher {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "slot watcher task failed");
        }
    }

    Ok(())
}
