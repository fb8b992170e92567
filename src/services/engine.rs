// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::metrics::IngestStats;
use crate::domain::error::AppError;
use crate::infrastructure::network::endpoints::EndpointPool;
use crate::services::enrichment::EnrichmentService;
use crate::services::orchestrator::ScanOrchestrator;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

/// Long-running scheduler: a scan loop chasing the chain head and an
/// optional enrichment loop, each on its own cadence.
pub struct Engine {
    orchestrator: ScanOrchestrator,
    enrichment: Option<EnrichmentService>,
    pool: Arc<EndpointPool>,
    stats: Arc<IngestStats>,
    scan_interval: Duration,
    enrich_interval: Duration,
    metrics_port: u16,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn new(
        orchestrator: ScanOrchestrator,
        enrichment: Option<EnrichmentService>,
        pool: Arc<EndpointPool>,
        stats: Arc<IngestStats>,
        scan_interval: Duration,
        enrich_interval: Duration,
        metrics_port: u16,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            enrichment,
            pool,
            stats,
            scan_interval,
            enrich_interval,
            metrics_port,
            shutdown,
        }
    }

    pub async fn run(self) -> Result<(), AppError> {
        let _metrics_addr = crate::common::metrics::spawn_metrics_server(
            self.metrics_port,
            self.stats.clone(),
            self.pool.clone(),
        )
        .await;

        tokio::try_join!(self.scan_loop(), self.enrich_loop()).map(|_| ())
    }

    /// A failed cycle is logged and the loop resumes on schedule; only
    /// shutdown ends it.
    async fn scan_loop(&self) -> Result<(), AppError> {
        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "engine", "Shutdown requested; stopping scan loop");
                return Ok(());
            }

            if let Err(e) = self.orchestrator.run_cycle().await {
                tracing::warn!(target: "engine", error = %e, "Scan cycle failed; retrying next interval");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "engine", "Shutdown requested; stopping scan loop");
                    return Ok(());
                }
                _ = sleep(self.scan_interval) => {}
            }
        }
    }

    async fn enrich_loop(&self) -> Result<(), AppError> {
        let Some(enrichment) = &self.enrichment else {
            tracing::info!(target: "engine", "Profile enrichment disabled");
            return Ok(());
        };

        loop {
            if self.shutdown.is_cancelled() {
                tracing::info!(target: "engine", "Shutdown requested; stopping enrichment loop");
                return Ok(());
            }

            match enrichment.run_once().await {
                Ok(summary) => {
                    self.stats
                        .profiles_enriched
                        .fetch_add(summary.enriched, Ordering::Relaxed);
                    if summary.attempted > 0 {
                        tracing::info!(
                            target: "engine",
                            attempted = summary.attempted,
                            enriched = summary.enriched,
                            placeholders = summary.placeholders,
                            "Enrichment pass finished"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "engine", error = %e, "Enrichment pass failed; retrying next interval");
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!(target: "engine", "Shutdown requested; stopping enrichment loop");
                    return Ok(());
                }
                _ = sleep(self.enrich_interval) => {}
            }
        }
    }
}
