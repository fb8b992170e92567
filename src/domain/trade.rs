// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use alloy::primitives::{Address, B256, U256};

/// One executed buy or sell decoded from the shares contract.
///
/// `supply` is the subject's share supply after this trade settled, which
/// makes the trade self-contained for pricing: the quoted buy/sell price of
/// the next share follows from `supply` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub trader: Address,
    pub subject: Address,
    pub is_buy: bool,
    pub share_amount: u64,
    pub eth_amount: U256,
    pub protocol_eth_amount: U256,
    pub subject_eth_amount: U256,
    pub supply: u64,
    pub transaction_hash: B256,
    pub block_number: u64,
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
}
