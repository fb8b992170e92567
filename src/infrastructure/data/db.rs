// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::domain::trade::Trade;
use crate::infrastructure::data::schema::{ProfilePatch, ShareRow, TradeRow};
use alloy::primitives::Address;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::collections::HashSet;
use std::str::FromStr;

use super::schema::ShareState;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Insert decoded trades in one transaction. Rescanned duplicates
    /// collide on `transaction_hash` and are absorbed; the return value
    /// counts rows actually written.
    pub async fn insert_trades(&self, trades: &[Trade]) -> Result<u64, AppError> {
        if trades.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Trade insert begin failed: {}", e)))?;

        let mut inserted = 0u64;
        for trade in trades {
            let result = sqlx::query(
                r#"
                INSERT INTO trades (
                    transaction_hash, trader, subject, is_buy, share_amount,
                    eth_amount, protocol_eth_amount, subject_eth_amount,
                    supply, block_number, timestamp
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(transaction_hash) DO NOTHING
                "#,
            )
            .bind(format!("{:#x}", trade.transaction_hash))
            .bind(format!("{:#x}", trade.trader))
            .bind(format!("{:#x}", trade.subject))
            .bind(trade.is_buy)
            .bind(trade.share_amount as i64)
            .bind(trade.eth_amount.to_string())
            .bind(trade.protocol_eth_amount.to_string())
            .bind(trade.subject_eth_amount.to_string())
            .bind(trade.supply as i64)
            .bind(trade.block_number as i64)
            .bind(trade.timestamp as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Trade insert failed: {}", e)))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Trade insert commit failed: {}", e)))?;
        Ok(inserted)
    }

    /// Scan checkpoint: highest persisted block number, 0 while empty.
    pub async fn max_trade_block(&self) -> Result<u64, AppError> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(block_number), 0) FROM trades")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Checkpoint query failed: {}", e)))?;
        Ok(max.max(0) as u64)
    }

    pub async fn recent_trades(&self, limit: i64) -> Result<Vec<TradeRow>, AppError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            r#"
            SELECT transaction_hash, trader, subject, is_buy, share_amount,
                   eth_amount, protocol_eth_amount, subject_eth_amount,
                   supply, block_number, timestamp, created_at
            FROM trades
            ORDER BY block_number DESC, transaction_hash
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Trade query failed: {}", e)))?;
        Ok(rows)
    }

    /// First sighting of a subject: creates the aggregate row, stamping
    /// `registered`. Subjects already present are left untouched.
    pub async fn insert_shares(&self, shares: &[ShareState]) -> Result<u64, AppError> {
        if shares.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Share insert begin failed: {}", e)))?;

        let mut inserted = 0u64;
        for share in shares {
            let result = sqlx::query(
                r#"
                INSERT INTO shares (
                    address, registered, last_transaction,
                    balance, buy_price, sell_price, supply
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(address) DO NOTHING
                "#,
            )
            .bind(format!("{:#x}", share.address))
            .bind(share.registered.map(|r| r as i64))
            .bind(share.last_transaction as i64)
            .bind(share.balance.to_string())
            .bind(share.buy_price.to_string())
            .bind(share.sell_price.to_string())
            .bind(share.supply as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Share insert failed: {}", e)))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Share insert commit failed: {}", e)))?;
        Ok(inserted)
    }

    /// Refresh aggregate columns from each subject's latest trade. Profile
    /// columns and `registered` are never touched here.
    pub async fn update_share_states(&self, shares: &[ShareState]) -> Result<(), AppError> {
        if shares.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Share update begin failed: {}", e)))?;

        for share in shares {
            sqlx::query(
                r#"
                UPDATE shares
                SET last_transaction = ?,
                    balance = ?,
                    buy_price = ?,
                    sell_price = ?,
                    supply = ?
                WHERE address = ?
                "#,
            )
            .bind(share.last_transaction as i64)
            .bind(share.balance.to_string())
            .bind(share.buy_price.to_string())
            .bind(share.sell_price.to_string())
            .bind(share.supply as i64)
            .bind(format!("{:#x}", share.address))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Share update failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Share update commit failed: {}", e)))?;
        Ok(())
    }

    /// Write enrichment results. `None` patch fields keep the stored value,
    /// so partial lookups never erase earlier data.
    pub async fn update_share_profiles(&self, patches: &[ProfilePatch]) -> Result<(), AppError> {
        if patches.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(format!("Profile update begin failed: {}", e)))?;

        for patch in patches {
            sqlx::query(
                r#"
                UPDATE shares
                SET twitter_username = COALESCE(?, twitter_username),
                    twitter_name = COALESCE(?, twitter_name),
                    twitter_score = COALESCE(?, twitter_score),
                    rank = COALESCE(?, rank)
                WHERE address = ?
                "#,
            )
            .bind(patch.twitter_username.as_deref())
            .bind(patch.twitter_name.as_deref())
            .bind(patch.twitter_score)
            .bind(patch.rank)
            .bind(format!("{:#x}", patch.address))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(format!("Profile update failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(format!("Profile update commit failed: {}", e)))?;
        Ok(())
    }

    /// All subject addresses with an aggregate row; one fetch lets a batch
    /// partition into creates and updates without per-row lookups.
    pub async fn known_subject_addresses(&self) -> Result<HashSet<Address>, AppError> {
        let rows: Vec<String> = sqlx::query_scalar("SELECT address FROM shares")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Storage(format!("Share address query failed: {}", e)))?;

        let mut known = HashSet::with_capacity(rows.len());
        for raw in rows {
            match Address::from_str(&raw) {
                Ok(address) => {
                    known.insert(address);
                }
                Err(e) => {
                    tracing::warn!(target: "db", address = %raw, error = %e, "Skipping unparseable share address");
                }
            }
        }
        Ok(known)
    }

    pub async fn share_by_address(&self, address: Address) -> Result<Option<ShareRow>, AppError> {
        let row = sqlx::query_as::<_, ShareRow>(
            r#"
            SELECT address, twitter_username, twitter_name, twitter_score,
                   registered, last_transaction, balance, buy_price,
                   sell_price, supply, rank
            FROM shares
            WHERE address = ?
            "#,
        )
        .bind(format!("{:#x}", address))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Share query failed: {}", e)))?;
        Ok(row)
    }

    /// Shares still waiting for profile enrichment, richest first.
    /// `balance` is a decimal string, so length-then-lexicographic ordering
    /// sorts numerically.
    pub async fn shares_missing_profile(&self, limit: i64) -> Result<Vec<ShareRow>, AppError> {
        let rows = sqlx::query_as::<_, ShareRow>(
            r#"
            SELECT address, twitter_username, twitter_name, twitter_score,
                   registered, last_transaction, balance, buy_price,
                   sell_price, supply, rank
            FROM shares
            WHERE twitter_username IS NULL
            ORDER BY LENGTH(balance) DESC, balance DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(format!("Missing-profile query failed: {}", e)))?;
        Ok(rows)
    }
}
