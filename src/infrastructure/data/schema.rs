// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use alloy::primitives::{Address, U256};
use chrono::NaiveDateTime;
use sqlx::FromRow;

/// Persisted trade. Wei amounts are decimal strings, addresses and hashes
/// lowercase 0x-hex; `transaction_hash` is the idempotency key.
#[derive(Debug, FromRow)]
pub struct TradeRow {
    pub transaction_hash: String,
    pub trader: String,
    pub subject: String,
    pub is_buy: bool,
    pub share_amount: i64,
    pub eth_amount: String,
    pub protocol_eth_amount: String,
    pub subject_eth_amount: String,
    pub supply: i64,
    pub block_number: i64,
    pub timestamp: i64,
    pub created_at: NaiveDateTime,
}

/// Aggregate state per subject, keyed by address.
#[derive(Debug, FromRow)]
pub struct ShareRow {
    pub address: String,
    pub twitter_username: Option<String>,
    pub twitter_name: Option<String>,
    pub twitter_score: Option<f64>,
    pub registered: Option<i64>,
    pub last_transaction: i64,
    pub balance: String,
    pub buy_price: String,
    pub sell_price: String,
    pub supply: i64,
    pub rank: Option<i64>,
}

/// One subject's refreshed aggregate, derived from its latest trade.
/// `registered` is set only when the row is first created.
#[derive(Debug, Clone)]
pub struct ShareState {
    pub address: Address,
    pub last_transaction: u64,
    pub balance: U256,
    pub buy_price: U256,
    pub sell_price: U256,
    pub supply: u64,
    pub registered: Option<u64>,
}

/// Profile fields written back by the enrichment cycle. `None` fields
/// leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub address: Address,
    pub twitter_username: Option<String>,
    pub twitter_name: Option<String>,
    pub twitter_score: Option<f64>,
    pub rank: Option<i64>,
}
