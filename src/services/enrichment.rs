// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::ProfilePatch;
use alloy::primitives::Address;
use rand::Rng;
use std::str::FromStr;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Username placeholder written once lookups are exhausted, so the
/// share leaves the enrichment queue instead of being retried forever.
const PLACEHOLDER_USERNAME: &str = "not_found";
const PLACEHOLDER_NAME: &str = "Not Found";

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub twitter_username: String,
    pub twitter_name: Option<String>,
    pub rank: Option<i64>,
}

/// Client for the share platform's user directory.
pub struct ProfileDirectory {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ProfileDirectory {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Initialization(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// `Ok(None)` when the directory has no usable profile for the
    /// address; transport and non-2xx responses are errors so the
    /// caller can decide to retry.
    pub async fn fetch(&self, address: Address) -> Result<Option<Profile>, AppError> {
        let url = format!("{}/users/{:#x}", self.base_url, address);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| AppError::Connection(
            format!("Profile request failed: {}", e),
        ))?;
        if !response.status().is_success() {
            return Err(AppError::ApiCall {
                provider: "profile".to_string(),
                status: response.status().as_u16(),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            AppError::Connection(format!("Profile response body invalid: {}", e))
        })?;
        let Some(username) = payload
            .get("twitterUsername")
            .and_then(|v| v.as_str())
            .filter(|u| !u.is_empty())
        else {
            return Ok(None);
        };

        Ok(Some(Profile {
            twitter_username: username.to_string(),
            twitter_name: payload
                .get("twitterName")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            rank: payload.get("rank").and_then(|v| v.as_i64()),
        }))
    }
}

/// Client for the external reputation score API.
pub struct ScoreClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ScoreClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Initialization(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// A score is only trusted when the provider flags success;
    /// anything else scores 0 rather than failing enrichment.
    pub async fn fetch_score(&self, username: &str) -> Result<f64, AppError> {
        let url = format!("{}/get_twitter_score", self.base_url);
        let mut query: Vec<(&str, &str)> = vec![("username", username)];
        if let Some(key) = &self.api_key {
            query.push(("api_key", key));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Score request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(AppError::ApiCall {
                provider: "score".to_string(),
                status: response.status().as_u16(),
            });
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            AppError::Connection(format!("Score response body invalid: {}", e))
        })?;
        if !payload
            .get("success")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Ok(0.0);
        }
        Ok(payload.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub attempted: usize,
    pub enriched: u64,
    pub placeholders: u64,
}

/// Backfills profile columns for shares that still lack one.
///
/// Each pass drains one batch ordered richest-first. A share whose
/// lookups all fail gets placeholder columns so the queue keeps
/// moving; later manual correction stays possible since patches only
/// ever fill columns.
pub struct EnrichmentService {
    db: Database,
    directory: ProfileDirectory,
    scores: ScoreClient,
    batch: u32,
    attempts: u32,
}

impl EnrichmentService {
    pub fn new(
        db: Database,
        directory: ProfileDirectory,
        scores: ScoreClient,
        batch: u32,
        attempts: u32,
    ) -> Self {
        Self {
            db,
            directory,
            scores,
            batch,
            attempts,
        }
    }

    pub async fn run_once(&self) -> Result<EnrichmentSummary, AppError> {
        let pending = self.db.shares_missing_profile(i64::from(self.batch)).await?;
        if pending.is_empty() {
            return Ok(EnrichmentSummary::default());
        }

        let mut summary = EnrichmentSummary {
            attempted: pending.len(),
            ..EnrichmentSummary::default()
        };
        let mut patches = Vec::with_capacity(pending.len());
        for share in &pending {
            let address = match Address::from_str(&share.address) {
                Ok(address) => address,
                Err(e) => {
                    tracing::warn!(
                        target: "enrichment",
                        address = %share.address,
                        error = %e,
                        "Skipping share with unparseable address"
                    );
                    continue;
                }
            };

            match self.lookup(address).await {
                Some(profile) => {
                    let score = match self.scores.fetch_score(&profile.twitter_username).await {
                        Ok(score) => score,
                        Err(e) => {
                            tracing::debug!(
                                target: "enrichment",
                                username = %profile.twitter_username,
                                error = %e,
                                "Score lookup failed; storing 0"
                            );
                            0.0
                        }
                    };
                    tracing::info!(
                        target: "enrichment",
                        address = %address,
                        username = %profile.twitter_username,
                        score,
                        "Profile resolved"
                    );
                    patches.push(ProfilePatch {
                        address,
                        twitter_username: Some(profile.twitter_username),
                        twitter_name: profile.twitter_name,
                        twitter_score: Some(score),
                        rank: profile.rank,
                    });
                    summary.enriched += 1;
                }
                None => {
                    tracing::info!(
                        target: "enrichment",
                        address = %address,
                        "Profile not found; writing placeholder"
                    );
                    patches.push(ProfilePatch {
                        address,
                        twitter_username: Some(PLACEHOLDER_USERNAME.to_string()),
                        twitter_name: Some(PLACEHOLDER_NAME.to_string()),
                        twitter_score: Some(0.0),
                        rank: Some(0),
                    });
                    summary.placeholders += 1;
                }
            }
        }

        self.db.update_share_profiles(&patches).await?;
        Ok(summary)
    }

    async fn lookup(&self, address: Address) -> Option<Profile> {
        for attempt in 1..=self.attempts {
            match self.directory.fetch(address).await {
                Ok(Some(profile)) => return Some(profile),
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "enrichment",
                        address = %address,
                        attempt,
                        error = %e,
                        "Profile lookup attempt failed"
                    );
                }
            }
            if attempt < self.attempts {
                // Jitter keeps the directory from seeing a fixed cadence.
                let wait = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(500..=1500)
                };
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }
        }
        None
    }
}
