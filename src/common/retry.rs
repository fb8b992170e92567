// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::time::Duration;

/// How a chain-read loop paces and bounds its attempts.
///
/// Production runs with [`RetryPolicy::forever`]: transient endpoint
/// failures are absorbed indefinitely at a fixed interval while the pool
/// steers traffic away from the failing endpoint. Tests substitute
/// [`RetryPolicy::bounded`] so an exhausted loop surfaces as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    interval: Duration,
}

impl RetryPolicy {
    pub const fn forever(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
        }
    }

    pub const fn bounded(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            interval,
        }
    }

    /// True when another try is allowed after `attempt` completed attempts.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            None => true,
            Some(max) => attempt < max,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(Duration::from_secs(1))
    }
}
