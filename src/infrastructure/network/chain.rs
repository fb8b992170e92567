// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::retry::RetryPolicy;
use crate::domain::error::AppError;
use crate::domain::trade::Trade;
use crate::infrastructure::network::decode;
use crate::infrastructure::network::endpoints::{EndpointPool, SelectedEndpoint};
use alloy::consensus::Transaction as ConsensusTx;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256, TxKind, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const RETRY_LOG_EVERY: u32 = 10;

/// Transactions addressed to the shares contract in one block, plus the
/// block timestamp every decoded trade inherits.
#[derive(Debug, Clone)]
pub struct ContractActivity {
    pub block_number: u64,
    pub timestamp: u64,
    pub transactions: Vec<B256>,
}

/// Chain reads the scanning pipeline depends on. Production uses
/// [`ChainClient`]; tests substitute an in-memory implementation.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn contract_activity(&self, block_number: u64) -> Result<ContractActivity, AppError>;
    async fn decode_trades(
        &self,
        tx_hash: B256,
        block_number: u64,
        timestamp: u64,
    ) -> Result<Vec<Trade>, AppError>;
    async fn chain_head(&self) -> Result<u64, AppError>;
    async fn balance(&self, subject: Address) -> Result<U256, AppError>;
}

/// Pool-backed chain reader. Every call selects a fresh endpoint, runs
/// under a per-call timeout and blames transient failures on the endpoint
/// that served them; the retry policy decides how long to keep going.
pub struct ChainClient {
    pool: Arc<EndpointPool>,
    contract: Address,
    event_signature: B256,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl ChainClient {
    pub fn new(
        pool: Arc<EndpointPool>,
        contract: Address,
        event_signature: B256,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            contract,
            event_signature,
            retry,
            request_timeout,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, AppError>
    where
        F: FnMut(SelectedEndpoint) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt: u32 = 1;
        loop {
            let selected = self.pool.select();
            match call(selected.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    self.pool.record_failure(&selected);
                    if !self.retry.allows_retry(attempt) {
                        tracing::warn!(
                            target: "chain",
                            op,
                            endpoint = selected.url(),
                            attempt,
                            error = %e,
                            "Chain read failed; retries exhausted"
                        );
                        return Err(e);
                    }
                    if attempt == 1 || attempt % RETRY_LOG_EVERY == 0 {
                        tracing::warn!(
                            target: "chain",
                            op,
                            endpoint = selected.url(),
                            attempt,
                            error = %e,
                            "Chain read failed; retrying"
                        );
                    }
                    tokio::time::sleep(self.retry.interval()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn rpc_error(endpoint: &str, reason: impl Into<String>) -> AppError {
    AppError::Rpc {
        endpoint: endpoint.to_string(),
        reason: reason.into(),
    }
}

fn matches_contract(kind: TxKind, contract: Address) -> bool {
    match kind {
        TxKind::Call(to) => to == contract,
        TxKind::Create => false,
    }
}

#[async_trait]
impl ChainReader for ChainClient {
    async fn contract_activity(&self, block_number: u64) -> Result<ContractActivity, AppError> {
        let contract = self.contract;
        let request_timeout = self.request_timeout;
        self.with_retry("fetch_block", move |selected| async move {
            let response = tokio::time::timeout(
                request_timeout,
                selected
                    .endpoint
                    .provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_number))
                    .full(),
            )
            .await;

            let block = match response {
                Err(_) => {
                    return Err(rpc_error(
                        selected.url(),
                        format!("block {block_number} fetch timed out"),
                    ));
                }
                Ok(Err(e)) => return Err(rpc_error(selected.url(), e.to_string())),
                Ok(Ok(None)) => {
                    return Err(rpc_error(
                        selected.url(),
                        format!("block {block_number} not available yet"),
                    ));
                }
                Ok(Ok(Some(block))) => block,
            };

            let timestamp = block.header.inner.timestamp;
            let transactions = block
                .transactions
                .into_transactions()
                .filter(|tx| matches_contract(tx.kind(), contract))
                .map(|tx| tx.tx_hash())
                .collect();

            Ok(ContractActivity {
                block_number,
                timestamp,
                transactions,
            })
        })
        .await
    }

    async fn decode_trades(
        &self,
        tx_hash: B256,
        block_number: u64,
        timestamp: u64,
    ) -> Result<Vec<Trade>, AppError> {
        let request_timeout = self.request_timeout;
        let receipt = self
            .with_retry("fetch_receipt", move |selected| async move {
                let response = tokio::time::timeout(
                    request_timeout,
                    selected.endpoint.provider.get_transaction_receipt(tx_hash),
                )
                .await;

                match response {
                    Err(_) => Err(rpc_error(
                        selected.url(),
                        format!("receipt {tx_hash:#x} fetch timed out"),
                    )),
                    Ok(Err(e)) => Err(rpc_error(selected.url(), e.to_string())),
                    Ok(Ok(None)) => Err(rpc_error(
                        selected.url(),
                        format!("receipt {tx_hash:#x} not available yet"),
                    )),
                    Ok(Ok(Some(receipt))) => Ok(receipt),
                }
            })
            .await?;

        // Reverted transactions emit no trades.
        if !receipt.status() {
            return Ok(Vec::new());
        }

        decode::trades_from_logs(
            receipt.inner.logs(),
            self.event_signature,
            tx_hash,
            block_number,
            timestamp,
        )
    }

    async fn chain_head(&self) -> Result<u64, AppError> {
        let request_timeout = self.request_timeout;
        self.with_retry("chain_head", move |selected| async move {
            match tokio::time::timeout(
                request_timeout,
                selected.endpoint.provider.get_block_number(),
            )
            .await
            {
                Err(_) => Err(rpc_error(selected.url(), "head fetch timed out")),
                Ok(Err(e)) => Err(rpc_error(selected.url(), e.to_string())),
                Ok(Ok(head)) => Ok(head),
            }
        })
        .await
    }

    async fn balance(&self, subject: Address) -> Result<U256, AppError> {
        let request_timeout = self.request_timeout;
        self.with_retry("balance", move |selected| async move {
            match tokio::time::timeout(
                request_timeout,
                selected.endpoint.provider.get_balance(subject),
            )
            .await
            {
                Err(_) => Err(rpc_error(
                    selected.url(),
                    format!("balance of {subject:#x} timed out"),
                )),
                Ok(Err(e)) => Err(rpc_error(selected.url(), e.to_string())),
                Ok(Ok(balance)) => Ok(balance),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_client(retry: RetryPolicy) -> ChainClient {
        let pool = EndpointPool::from_urls(&[
            "http://one:8545".to_string(),
            "http://two:8545".to_string(),
        ])
        .expect("pool");
        ChainClient::new(
            Arc::new(pool),
            Address::repeat_byte(0x11),
            B256::repeat_byte(0x22),
            retry,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn only_calls_into_the_contract_match() {
        let contract = Address::repeat_byte(0x11);
        assert!(matches_contract(TxKind::Call(contract), contract));
        assert!(!matches_contract(
            TxKind::Call(Address::repeat_byte(0x22)),
            contract
        ));
        assert!(!matches_contract(TxKind::Create, contract));
    }

    #[tokio::test]
    async fn transient_failures_retry_on_fresh_endpoints() {
        let client = test_client(RetryPolicy::bounded(5, Duration::from_millis(1)));
        let attempts = AtomicU32::new(0);

        let result = client
            .with_retry("test_read", |selected| {
                let n = attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    if n < 2 {
                        Err(rpc_error(selected.url(), "boom"))
                    } else {
                        Ok(7u32)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("recovers"), 7);
        assert_eq!(attempts.load(Ordering::Relaxed), 3);

        let snapshot = client.pool.snapshot();
        let failures: usize = snapshot.iter().map(|s| s.recent_failures).sum();
        let requests: u64 = snapshot.iter().map(|s| s.requests).sum();
        assert_eq!(failures, 2);
        assert_eq!(requests, 3);
    }

    #[tokio::test]
    async fn exhausted_policy_surfaces_the_transient_error() {
        let client = test_client(RetryPolicy::bounded(2, Duration::from_millis(1)));
        let attempts = AtomicU32::new(0);

        let result: Result<u32, AppError> = client
            .with_retry("test_read", |selected| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async move { Err(rpc_error(selected.url(), "down")) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Rpc { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn final_errors_never_retry_or_blame_the_endpoint() {
        let client = test_client(RetryPolicy::bounded(5, Duration::from_millis(1)));
        let attempts = AtomicU32::new(0);

        let result: Result<u32, AppError> = client
            .with_retry("test_read", |_selected| {
                attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    Err(AppError::Decode {
                        hash: "0xab".to_string(),
                        reason: "bad payload".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Decode { .. })));
        assert_eq!(attempts.load(Ordering::Relaxed), 1);

        let failures: usize = client.pool.snapshot().iter().map(|s| s.recent_failures).sum();
        assert_eq!(failures, 0);
    }
}
