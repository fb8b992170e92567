// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::metrics::IngestStats;
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::services::aggregate::TradeAggregator;
use crate::services::scanner::BatchScanner;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::Semaphore;

use crate::infrastructure::network::chain::ChainReader;

/// Cap on block ranges scanned in parallel within one cycle.
pub const RANGE_CONCURRENCY: usize = 5;

/// Split `(last_scanned, head]` into inclusive ranges of at most
/// `batch_size` blocks.
pub fn partition_ranges(last_scanned: u64, head: u64, batch_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if head <= last_scanned || batch_size == 0 {
        return ranges;
    }
    let mut start = last_scanned + 1;
    while start <= head {
        let end = head.min(start.saturating_add(batch_size - 1));
        ranges.push((start, end));
        match end.checked_add(1) {
            Some(next) => start = next,
            None => break,
        }
    }
    ranges
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No contract trades in the range.
    Empty,
    /// Trades persisted; `inserted` excludes rescanned duplicates.
    Committed { inserted: u64 },
    ScanFailed(String),
    PersistFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeReport {
    pub start_block: u64,
    pub end_block: u64,
    pub decoded: u64,
    pub outcome: RangeOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub from_block: u64,
    pub to_block: u64,
    pub ranges: usize,
    pub decoded: u64,
    pub inserted: u64,
    pub failures: u64,
}

/// Drives one scan cycle: checkpoint, partition, scan ranges in
/// parallel, persist and aggregate.
///
/// The checkpoint is the highest block number already in storage, so a
/// failed range behind a committed one is not revisited; the gap is
/// logged and accepted rather than stalling the head chase.
pub struct ScanOrchestrator {
    chain: Arc<dyn ChainReader>,
    db: Database,
    scanner: BatchScanner,
    aggregator: TradeAggregator,
    stats: Arc<IngestStats>,
    batch_size: u64,
    range_slots: Arc<Semaphore>,
}

impl ScanOrchestrator {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        db: Database,
        scanner: BatchScanner,
        aggregator: TradeAggregator,
        stats: Arc<IngestStats>,
        batch_size: u64,
    ) -> Self {
        Self {
            chain,
            db,
            scanner,
            aggregator,
            stats,
            batch_size,
            range_slots: Arc::new(Semaphore::new(RANGE_CONCURRENCY)),
        }
    }

    /// One cycle against the current head. `Ok(None)` means the
    /// checkpoint already covers the head and nothing was scanned.
    pub async fn run_cycle(&self) -> Result<Option<CycleSummary>, AppError> {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let last_scanned = self.db.max_trade_block().await?;
        let head = self.chain.chain_head().await?;
        if head <= last_scanned {
            tracing::debug!(
                target: "orchestrator",
                checkpoint = last_scanned,
                head,
                "Chain head not past checkpoint; skipping cycle"
            );
            return Ok(None);
        }

        let ranges = partition_ranges(last_scanned, head, self.batch_size);
        let mut jobs = Vec::with_capacity(ranges.len());
        for (start, end) in &ranges {
            let (start, end) = (*start, *end);
            let slots = self.range_slots.clone();
            jobs.push(async move {
                let permit = match slots.acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        return RangeReport {
                            start_block: start,
                            end_block: end,
                            decoded: 0,
                            outcome: RangeOutcome::ScanFailed(format!(
                                "Range semaphore closed: {}",
                                e
                            )),
                        };
                    }
                };
                let report = self.process_range(start, end).await;
                drop(permit);
                report
            });
        }

        let mut summary = CycleSummary {
            from_block: last_scanned + 1,
            to_block: head,
            ranges: ranges.len(),
            decoded: 0,
            inserted: 0,
            failures: 0,
        };
        for report in join_all(jobs).await {
            match &report.outcome {
                RangeOutcome::Empty => {
                    self.stats.ranges_scanned.fetch_add(1, Ordering::Relaxed);
                }
                RangeOutcome::Committed { inserted } => {
                    self.stats.ranges_scanned.fetch_add(1, Ordering::Relaxed);
                    self.stats
                        .trades_decoded
                        .fetch_add(report.decoded, Ordering::Relaxed);
                    self.stats
                        .trades_inserted
                        .fetch_add(*inserted, Ordering::Relaxed);
                    summary.decoded += report.decoded;
                    summary.inserted += inserted;
                }
                RangeOutcome::ScanFailed(reason) | RangeOutcome::PersistFailed(reason) => {
                    self.stats.range_failures.fetch_add(1, Ordering::Relaxed);
                    summary.failures += 1;
                    tracing::warn!(
                        target: "orchestrator",
                        start_block = report.start_block,
                        end_block = report.end_block,
                        reason = %reason,
                        "Range failed; blocks may be skipped if a later range committed"
                    );
                }
            }
        }

        tracing::info!(
            target: "orchestrator",
            from_block = summary.from_block,
            to_block = summary.to_block,
            ranges = summary.ranges,
            decoded = summary.decoded,
            inserted = summary.inserted,
            failures = summary.failures,
            "Scan cycle finished"
        );
        Ok(Some(summary))
    }

    async fn process_range(&self, start: u64, end: u64) -> RangeReport {
        let trades = match self.scanner.scan_blocks(start, end).await {
            Ok(trades) => trades,
            Err(e) => {
                return RangeReport {
                    start_block: start,
                    end_block: end,
                    decoded: 0,
                    outcome: RangeOutcome::ScanFailed(e.to_string()),
                };
            }
        };
        if trades.is_empty() {
            return RangeReport {
                start_block: start,
                end_block: end,
                decoded: 0,
                outcome: RangeOutcome::Empty,
            };
        }

        let decoded = trades.len() as u64;
        // Persist and aggregate are deliberately independent: share rows
        // are recomputed from chain state, so they must not be rolled
        // back when the raw insert fails, and vice versa.
        let (persisted, aggregated) = tokio::join!(
            self.db.insert_trades(&trades),
            self.aggregator.reconcile(&trades)
        );

        match aggregated {
            Ok(shares) => {
                self.stats
                    .shares_created
                    .fetch_add(shares.created, Ordering::Relaxed);
                self.stats
                    .shares_updated
                    .fetch_add(shares.updated, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(
                    target: "orchestrator",
                    start_block = start,
                    end_block = end,
                    error = %e,
                    "Share aggregation failed; trades kept, shares catch up next touch"
                );
            }
        }

        let outcome = match persisted {
            Ok(inserted) => RangeOutcome::Committed { inserted },
            Err(e) => RangeOutcome::PersistFailed(e.to_string()),
        };
        RangeReport {
            start_block: start,
            end_block: end,
            decoded,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::Trade;
    use crate::infrastructure::network::chain::ContractActivity;
    use alloy::primitives::{Address, B256, U256};
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[test]
    fn partition_covers_the_open_interval_exactly() {
        assert_eq!(partition_ranges(100, 120, 50), vec![(101, 120)]);
        assert_eq!(
            partition_ranges(0, 120, 50),
            vec![(1, 50), (51, 100), (101, 120)]
        );
        assert_eq!(partition_ranges(10, 10, 50), Vec::new());
        assert_eq!(partition_ranges(11, 10, 50), Vec::new());
        assert_eq!(partition_ranges(0, 10, 0), Vec::new());
    }

    #[test]
    fn partition_is_contiguous_for_any_small_input() {
        for last in 0u64..=5 {
            for head in 0u64..=9 {
                for batch in 1u64..=4 {
                    let ranges = partition_ranges(last, head, batch);
                    let mut covered = Vec::new();
                    for (start, end) in &ranges {
                        assert!(start <= end);
                        assert!(end - start + 1 <= batch);
                        covered.extend(*start..=*end);
                    }
                    let expected: Vec<u64> = if head > last {
                        (last + 1..=head).collect()
                    } else {
                        Vec::new()
                    };
                    assert_eq!(covered, expected);
                }
            }
        }
    }

    #[test]
    fn partition_survives_a_head_at_the_integer_limit() {
        let ranges = partition_ranges(u64::MAX - 3, u64::MAX, 2);
        assert_eq!(
            ranges,
            vec![(u64::MAX - 2, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    struct ScriptedChain {
        head: u64,
        activity: HashMap<u64, Vec<B256>>,
        broken_blocks: Vec<u64>,
        balance_fails: bool,
    }

    impl ScriptedChain {
        fn new(head: u64) -> Self {
            Self {
                head,
                activity: HashMap::new(),
                broken_blocks: Vec::new(),
                balance_fails: false,
            }
        }

        fn with_tx(mut self, block_number: u64, hash_byte: u8) -> Self {
            self.activity
                .entry(block_number)
                .or_default()
                .push(B256::repeat_byte(hash_byte));
            self
        }
    }

    #[async_trait]
    impl ChainReader for ScriptedChain {
        async fn contract_activity(&self, block_number: u64) -> Result<ContractActivity, AppError> {
            if self.broken_blocks.contains(&block_number) {
                return Err(AppError::Rpc {
                    endpoint: "http://mock".to_string(),
                    reason: "unreachable".to_string(),
                });
            }
            Ok(ContractActivity {
                block_number,
                timestamp: block_number * 10,
                transactions: self.activity.get(&block_number).cloned().unwrap_or_default(),
            })
        }

        async fn decode_trades(
            &self,
            tx_hash: B256,
            block_number: u64,
            timestamp: u64,
        ) -> Result<Vec<Trade>, AppError> {
            Ok(vec![Trade {
                trader: Address::repeat_byte(0xee),
                subject: Address::repeat_byte(0x42),
                is_buy: true,
                share_amount: 1,
                eth_amount: U256::from(1u64),
                protocol_eth_amount: U256::ZERO,
                subject_eth_amount: U256::ZERO,
                supply: block_number,
                transaction_hash: tx_hash,
                block_number,
                timestamp,
            }])
        }

        async fn chain_head(&self) -> Result<u64, AppError> {
            Ok(self.head)
        }

        async fn balance(&self, _address: Address) -> Result<U256, AppError> {
            if self.balance_fails {
                return Err(AppError::Rpc {
                    endpoint: "http://mock".to_string(),
                    reason: "unreachable".to_string(),
                });
            }
            Ok(U256::from(7u64))
        }
    }

    fn orchestrator_for(chain: Arc<ScriptedChain>, db: Database) -> ScanOrchestrator {
        let stats = Arc::new(IngestStats::default());
        let scanner = BatchScanner::new(chain.clone(), stats.clone());
        let aggregator = TradeAggregator::new(chain.clone(), db.clone());
        ScanOrchestrator::new(chain, db, scanner, aggregator, stats, 50)
    }

    #[tokio::test]
    async fn cycle_persists_trades_and_advances_the_checkpoint() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let chain = Arc::new(ScriptedChain::new(117).with_tx(103, 0xa1).with_tx(117, 0xa2));
        let orchestrator = orchestrator_for(chain, db.clone());

        let summary = orchestrator.run_cycle().await.unwrap().expect("summary");
        assert_eq!(summary.from_block, 1);
        assert_eq!(summary.to_block, 117);
        assert_eq!(summary.ranges, 3);
        assert_eq!(summary.decoded, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.failures, 0);
        assert_eq!(db.max_trade_block().await.unwrap(), 117);

        // Aggregates landed alongside the raw trades.
        let share = db
            .share_by_address(Address::repeat_byte(0x42))
            .await
            .unwrap()
            .expect("share row");
        assert_eq!(share.last_transaction, 1170);

        // Head unchanged: the next cycle has nothing to do.
        assert!(orchestrator.run_cycle().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_range_is_reported_while_others_commit() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let mut chain = ScriptedChain::new(100).with_tx(60, 0xb1);
        chain.broken_blocks.push(10);
        let orchestrator = orchestrator_for(Arc::new(chain), db.clone());

        let summary = orchestrator.run_cycle().await.unwrap().expect("summary");
        assert_eq!(summary.ranges, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.inserted, 1);
        // The committed later range owns the checkpoint now.
        assert_eq!(db.max_trade_block().await.unwrap(), 60);
    }

    #[tokio::test]
    async fn aggregation_failure_keeps_the_persisted_trades() {
        let db = Database::new("sqlite::memory:").await.expect("db");
        let mut chain = ScriptedChain::new(20).with_tx(5, 0xc1);
        chain.balance_fails = true;
        let orchestrator = orchestrator_for(Arc::new(chain), db.clone());

        let summary = orchestrator.run_cycle().await.unwrap().expect("summary");
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.inserted, 1);
        assert_eq!(db.max_trade_block().await.unwrap(), 5);
        assert!(
            db.share_by_address(Address::repeat_byte(0x42))
                .await
                .unwrap()
                .is_none()
        );
    }
}
