// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::pricing;
use crate::domain::trade::Trade;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::ShareState;
use crate::infrastructure::network::chain::ChainReader;
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: u64,
    pub updated: u64,
}

/// Reduce a trade batch to each subject's most recent trade.
///
/// A strictly newer timestamp wins; on equal timestamps the trade seen
/// later in the slice replaces the earlier one, so replaying a batch in
/// storage order converges on the same row.
fn latest_trades_per_subject(trades: &[Trade]) -> HashMap<Address, &Trade> {
    let mut latest: HashMap<Address, &Trade> = HashMap::new();
    for trade in trades {
        match latest.get(&trade.subject) {
            Some(current) if current.timestamp > trade.timestamp => {}
            _ => {
                latest.insert(trade.subject, trade);
            }
        }
    }
    latest
}

/// Folds decoded trades into per-subject share rows.
///
/// Each subject's row carries the supply after its latest trade, the
/// subject's current native balance and the spot buy/sell quote for a
/// single share. Subjects without a row yet are created with their
/// `registered` timestamp stamped; existing rows only get the aggregate
/// columns refreshed.
pub struct TradeAggregator {
    chain: Arc<dyn ChainReader>,
    db: Database,
}

impl TradeAggregator {
    pub fn new(chain: Arc<dyn ChainReader>, db: Database) -> Self {
        Self { chain, db }
    }

    pub async fn reconcile(&self, trades: &[Trade]) -> Result<ReconcileSummary, AppError> {
        if trades.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let latest = latest_trades_per_subject(trades);
        // One membership fetch for the whole batch; per-subject lookups
        // would race against our own inserts within the cycle.
        let known = self.db.known_subject_addresses().await?;

        let mut creates = Vec::new();
        let mut updates = Vec::new();
        for trade in latest.values() {
            let balance = self.chain.balance(trade.subject).await?;
            let is_new = !known.contains(&trade.subject);
            let state = ShareState {
                address: trade.subject,
                last_transaction: trade.timestamp,
                balance,
                buy_price: pricing::buy_price_after_fee(trade.supply, 1),
                sell_price: pricing::sell_price_after_fee(trade.supply, 1),
                supply: trade.supply,
                registered: is_new.then_some(trade.timestamp),
            };
            if is_new {
                creates.push(state);
            } else {
                updates.push(state);
            }
        }

        let created = self.db.insert_shares(&creates).await?;
        self.db.update_share_states(&updates).await?;
        Ok(ReconcileSummary {
            created,
            updated: updates.len() as u64,
        })
    }
}
