// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::trade::Trade;
use crate::infrastructure::data::abi;
use alloy::primitives::{B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;

/// Extract every Trade carried by a receipt's logs.
///
/// Logs whose topic0 differs from `signature` are skipped silently; a log
/// that matches but fails to decode poisons the whole transaction with a
/// final [`AppError::Decode`]. Callers drop such transactions instead of
/// retrying them.
pub fn trades_from_logs(
    logs: &[Log],
    signature: B256,
    tx_hash: B256,
    block_number: u64,
    timestamp: u64,
) -> Result<Vec<Trade>, AppError> {
    let mut trades = Vec::new();
    for log in logs {
        let Some(topic0) = log.topic0() else {
            continue;
        };
        if topic0 != &signature {
            continue;
        }

        let event = abi::Trade::decode_log_data(log.data()).map_err(|e| AppError::Decode {
            hash: format!("{tx_hash:#x}"),
            reason: format!("Trade log decode failed: {e}"),
        })?;

        trades.push(Trade {
            trader: event.trader,
            subject: event.subject,
            is_buy: event.isBuy,
            share_amount: checked_u64("shareAmount", event.shareAmount, tx_hash)?,
            eth_amount: event.ethAmount,
            protocol_eth_amount: event.protocolEthAmount,
            subject_eth_amount: event.subjectEthAmount,
            supply: checked_u64("supply", event.supply, tx_hash)?,
            transaction_hash: tx_hash,
            block_number,
            timestamp,
        });
    }
    Ok(trades)
}

fn checked_u64(field: &str, value: U256, tx_hash: B256) -> Result<u64, AppError> {
    u64::try_from(value).map_err(|_| AppError::Decode {
        hash: format!("{tx_hash:#x}"),
        reason: format!("{field} exceeds u64: {value}"),
    })
}
