// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::metrics::IngestStats;
use crate::domain::error::AppError;
use crate::domain::trade::Trade;
use crate::infrastructure::network::chain::{ChainReader, ContractActivity};
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Semaphore;

/// Cap on transaction decodes in flight within one block.
pub const DECODE_CONCURRENCY: usize = 5;

/// Walks a block range and decodes every contract trade in it.
///
/// Blocks are read strictly in order so a range's trades arrive
/// oldest-first; the per-transaction receipt decodes inside a block
/// overlap up to [`DECODE_CONCURRENCY`].
pub struct BatchScanner {
    chain: Arc<dyn ChainReader>,
    stats: Arc<IngestStats>,
    decode_slots: Arc<Semaphore>,
}

impl BatchScanner {
    pub fn new(chain: Arc<dyn ChainReader>, stats: Arc<IngestStats>) -> Self {
        Self {
            chain,
            stats,
            decode_slots: Arc::new(Semaphore::new(DECODE_CONCURRENCY)),
        }
    }

    /// Decode all trades in `[start, end]` (inclusive).
    ///
    /// A transaction whose receipt cannot be decoded is logged, counted
    /// and skipped; it never takes the rest of the range down. Transport
    /// errors do fail the range so the caller can rescan it.
    pub async fn scan_blocks(&self, start: u64, end: u64) -> Result<Vec<Trade>, AppError> {
        let mut trades = Vec::new();

        for number in start..=end {
            let ContractActivity {
                block_number,
                timestamp,
                transactions,
            } = self.chain.contract_activity(number).await?;
            if transactions.is_empty() {
                continue;
            }

            let mut jobs = Vec::with_capacity(transactions.len());
            for tx_hash in transactions {
                let chain = self.chain.clone();
                let slots = self.decode_slots.clone();
                jobs.push(async move {
                    let permit = match slots.acquire_owned().await {
                        Ok(p) => p,
                        Err(e) => {
                            return (
                                tx_hash,
                                Err(AppError::Initialization(format!(
                                    "Decode semaphore closed: {}",
                                    e
                                ))),
                            );
                        }
                    };
                    let result = chain.decode_trades(tx_hash, block_number, timestamp).await;
                    drop(permit);
                    (tx_hash, result)
                });
            }

            for (tx_hash, result) in join_all(jobs).await {
                match result {
                    Ok(batch) => trades.extend(batch),
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            target: "scanner",
                            tx = %tx_hash,
                            error = %e,
                            "Trade decode failed; skipping transaction"
                        );
                    }
                }
            }
        }

        Ok(trades)
    }
}
