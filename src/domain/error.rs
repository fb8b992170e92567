// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Connection failed to endpoint: {0}")]
    Connection(String),

    #[error("RPC call via {endpoint} failed: {reason}")]
    Rpc { endpoint: String, reason: String },

    #[error("Trade decode failed for {hash}: {reason}")]
    Decode { hash: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("External API error: {provider} responded with {status}")]
    ApiCall { provider: String, status: u16 },

    #[error("Validation failed for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Address {0} is invalid")]
    InvalidAddress(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl AppError {
    /// Endpoint-class failures worth retrying on another endpoint.
    /// Decode and validation failures are final for their transaction.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Rpc { .. } | AppError::Connection(_))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}
