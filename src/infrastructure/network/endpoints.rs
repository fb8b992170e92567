// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use crate::infrastructure::network::provider::{ConnectionFactory, HttpProvider};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Failures older than this stop counting against an endpoint.
pub const FAILURE_WINDOW: Duration = Duration::from_secs(600);

pub struct Endpoint {
    pub url: String,
    pub provider: HttpProvider,
}

#[derive(Default)]
struct EndpointHealth {
    requests: u64,
    last_selected: Option<Instant>,
    recent_failures: VecDeque<Instant>,
}

/// Health-ranked pool of HTTP RPC endpoints.
///
/// Selection order is least-recently-used first, then lowest
/// recent-failure ratio, then lowest total request count. Failures are
/// recorded by the caller against the endpoint that served the request
/// and age out of the ranking after [`FAILURE_WINDOW`].
pub struct EndpointPool {
    endpoints: Vec<Arc<Endpoint>>,
    health: DashMap<usize, EndpointHealth>,
}

/// Handle returned by [`EndpointPool::select`]; keeps the endpoint index
/// so failures can be blamed on the endpoint that actually served.
#[derive(Clone)]
pub struct SelectedEndpoint {
    pub endpoint: Arc<Endpoint>,
    index: usize,
}

impl SelectedEndpoint {
    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

pub struct EndpointSnapshot {
    pub url: String,
    pub requests: u64,
    pub recent_failures: usize,
}

impl EndpointPool {
    pub fn from_urls(urls: &[String]) -> Result<Self, AppError> {
        if urls.is_empty() {
            return Err(AppError::Config(
                "Endpoint pool needs at least one RPC URL".to_string(),
            ));
        }
        let mut endpoints = Vec::with_capacity(urls.len());
        for raw in urls {
            let provider = ConnectionFactory::http(raw)?;
            endpoints.push(Arc::new(Endpoint {
                url: raw.clone(),
                provider,
            }));
        }
        let health = DashMap::new();
        for index in 0..endpoints.len() {
            health.insert(index, EndpointHealth::default());
        }
        Ok(Self { endpoints, health })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn select(&self) -> SelectedEndpoint {
        self.select_at(Instant::now())
    }

    pub(crate) fn select_at(&self, now: Instant) -> SelectedEndpoint {
        let mut ranked: Vec<(u128, f64, u64, usize)> = Vec::with_capacity(self.endpoints.len());
        for index in 0..self.endpoints.len() {
            let mut entry = self.health.entry(index).or_default();
            prune_expired(&mut entry.recent_failures, now);
            // Never-selected endpoints rank as idle forever.
            let idle_nanos = entry
                .last_selected
                .map(|t| now.saturating_duration_since(t).as_nanos())
                .unwrap_or(u128::MAX);
            let failure_ratio = entry.recent_failures.len() as f64 / (entry.requests as f64 + 1e-6);
            ranked.push((idle_nanos, failure_ratio, entry.requests, index));
        }
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let index = ranked.first().map(|r| r.3).unwrap_or(0);
        if let Some(mut entry) = self.health.get_mut(&index) {
            entry.requests += 1;
            entry.last_selected = Some(now);
        }
        SelectedEndpoint {
            endpoint: self.endpoints[index].clone(),
            index,
        }
    }

    pub fn record_failure(&self, selected: &SelectedEndpoint) {
        self.record_failure_at(selected.index, Instant::now());
    }

    fn record_failure_at(&self, index: usize, at: Instant) {
        if let Some(mut entry) = self.health.get_mut(&index) {
            entry.recent_failures.push_back(at);
        }
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        let now = Instant::now();
        (0..self.endpoints.len())
            .map(|index| {
                let mut entry = self.health.entry(index).or_default();
                prune_expired(&mut entry.recent_failures, now);
                EndpointSnapshot {
                    url: self.endpoints[index].url.clone(),
                    requests: entry.requests,
                    recent_failures: entry.recent_failures.len(),
                }
            })
            .collect()
    }
}

fn prune_expired(failures: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = failures.front() {
        if now.saturating_duration_since(*front) > FAILURE_WINDOW {
            failures.pop_front();
        } else {
            break;
        }
    }
}
