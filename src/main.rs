// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use clap::Parser;
use mitander_shares::app::config::GlobalSettings;
use mitander_shares::app::logging::setup_logging;
use mitander_shares::common::metrics::IngestStats;
use mitander_shares::domain::error::AppError;
use mitander_shares::infrastructure::data::db::Database;
use mitander_shares::infrastructure::network::chain::ChainClient;
use mitander_shares::infrastructure::network::endpoints::EndpointPool;
use mitander_shares::services::aggregate::TradeAggregator;
use mitander_shares::services::engine::Engine;
use mitander_shares::services::enrichment::{EnrichmentService, ProfileDirectory, ScoreClient};
use mitander_shares::services::orchestrator::ScanOrchestrator;
use mitander_shares::services::scanner::BatchScanner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "mitander shares indexer")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Run a single scan cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Skip profile enrichment even when a profile API is configured
    #[arg(long, default_value_t = false)]
    no_enrichment: bool,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = GlobalSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(if settings.debug { "debug" } else { "info" }, false);

    let database_url = settings.database_url();
    let db = Database::new(&database_url).await?;

    let pool = Arc::new(EndpointPool::from_urls(&settings.rpc_endpoints)?);
    tracing::info!(
        target: "config",
        endpoints = pool.len(),
        contract = %settings.contract_address,
        db = %database_url,
        "Configuration loaded"
    );

    let chain = Arc::new(ChainClient::new(
        pool.clone(),
        settings.contract_address,
        settings.event_signature(),
        settings.retry_policy(),
        settings.request_timeout(),
    ));
    let stats = Arc::new(IngestStats::default());
    let scanner = BatchScanner::new(chain.clone(), stats.clone());
    let aggregator = TradeAggregator::new(chain.clone(), db.clone());
    let orchestrator = ScanOrchestrator::new(
        chain.clone(),
        db.clone(),
        scanner,
        aggregator,
        stats.clone(),
        settings.batch_size,
    );

    if cli.once {
        match orchestrator.run_cycle().await? {
            Some(summary) => tracing::info!(
                target: "engine",
                inserted = summary.inserted,
                failures = summary.failures,
                "Single cycle done"
            ),
            None => tracing::info!(target: "engine", "Single cycle done; already at head"),
        }
        return Ok(());
    }

    let enrichment = match settings.profile_api_url_value() {
        Some(profile_api_url) if !cli.no_enrichment => {
            let directory =
                ProfileDirectory::new(profile_api_url, settings.profile_api_token_value())?;
            let scores =
                ScoreClient::new(settings.score_api_url_value(), settings.score_api_key_value())?;
            Some(EnrichmentService::new(
                db.clone(),
                directory,
                scores,
                settings.enrichment_batch,
                settings.enrichment_attempts,
            ))
        }
        _ => None,
    };

    let metrics_port = cli
        .metrics_port
        .or_else(|| {
            std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(settings.metrics_port);

    let shutdown = CancellationToken::new();
    {
        let shutdown_on_ctrlc = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(target: "shutdown", "Ctrl+C received; requesting graceful shutdown");
                shutdown_on_ctrlc.cancel();
            }
        });
    }

    let engine = Engine::new(
        orchestrator,
        enrichment,
        pool,
        stats,
        settings.scan_interval(),
        settings.enrich_interval(),
        metrics_port,
        shutdown,
    );
    engine.run().await
}
