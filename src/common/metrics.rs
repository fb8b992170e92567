// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::infrastructure::network::endpoints::EndpointPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Counters shared across the scan, aggregate and enrichment paths.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub cycles: AtomicU64,
    pub ranges_scanned: AtomicU64,
    pub range_failures: AtomicU64,
    pub trades_decoded: AtomicU64,
    pub trades_inserted: AtomicU64,
    pub decode_failures: AtomicU64,
    pub shares_created: AtomicU64,
    pub shares_updated: AtomicU64,
    pub profiles_enriched: AtomicU64,
}

pub async fn spawn_metrics_server(
    port: u16,
    stats: Arc<IngestStats>,
    pool: Arc<EndpointPool>,
) -> Option<SocketAddr> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("Metrics server failed to bind: {}", e);
            return None;
        }
    };

    let local = listener.local_addr().ok();
    if let Some(addr) = local {
        tracing::info!("Metrics server listening on {}", addr);
    }

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let body = render_metrics(&stats, &pool);
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
                Err(e) => {
                    tracing::warn!("Metrics accept error: {}", e);
                    continue;
                }
            }
        }
    });

    local
}

fn render_metrics(stats: &Arc<IngestStats>, pool: &Arc<EndpointPool>) -> String {
    use std::sync::atomic::Ordering;

    let mut body = format!(
        concat!(
            "# TYPE ingest_cycles counter\ningest_cycles {}\n",
            "# TYPE ingest_ranges_scanned counter\ningest_ranges_scanned {}\n",
            "# TYPE ingest_range_failures counter\ningest_range_failures {}\n",
            "# TYPE ingest_trades_decoded counter\ningest_trades_decoded {}\n",
            "# TYPE ingest_trades_inserted counter\ningest_trades_inserted {}\n",
            "# TYPE ingest_decode_failures counter\ningest_decode_failures {}\n",
            "# TYPE ingest_shares_created counter\ningest_shares_created {}\n",
            "# TYPE ingest_shares_updated counter\ningest_shares_updated {}\n",
            "# TYPE ingest_profiles_enriched counter\ningest_profiles_enriched {}\n"
        ),
        stats.cycles.load(Ordering::Relaxed),
        stats.ranges_scanned.load(Ordering::Relaxed),
        stats.range_failures.load(Ordering::Relaxed),
        stats.trades_decoded.load(Ordering::Relaxed),
        stats.trades_inserted.load(Ordering::Relaxed),
        stats.decode_failures.load(Ordering::Relaxed),
        stats.shares_created.load(Ordering::Relaxed),
        stats.shares_updated.load(Ordering::Relaxed),
        stats.profiles_enriched.load(Ordering::Relaxed),
    );

    for endpoint in pool.snapshot() {
        body.push_str(&format!(
            "# TYPE endpoint_requests gauge\nendpoint_requests{{url=\"{}\"}} {}\n",
            endpoint.url, endpoint.requests
        ));
        body.push_str(&format!(
            "# TYPE endpoint_recent_failures gauge\nendpoint_recent_failures{{url=\"{}\"}} {}\n",
            endpoint.url, endpoint.recent_failures
        ));
    }

    body
}
