//! Backoff bookkeeping for server-side throttling (HTTP 429).
//!
//! A server hint (`Retry-After` seconds or a millisecond body field) is honored
//! up to `max_retry_after_ms`. Without a hint the delay starts at the fallback
//! delay and doubles per consecutive throttle of the same endpoint class, capped
//! at `max_delay_ms`, with optional jitter so throttled clients don't retry in lockstep.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay used when the server gives no hint (first throttle).
    pub default_retry_after_ms: u64,
    /// Upper bound for computed (unhinted) delays.
    pub max_delay_ms: u64,
    /// Upper bound for server-provided hints.
    pub max_retry_after_ms: u64,
    pub jitter: bool,
    /// Maximum jitter as a fraction of the computed delay.
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            default_retry_after_ms: 5_000,
            max_delay_ms: 60_000,
            max_retry_after_ms: 3_600_000,
            jitter: true,
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    cfg: BackoffConfig,
}

impl BackoffPolicy {
    pub fn new(cfg: BackoffConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.cfg
    }

    /// Delay before the class should be tried again.
    ///
    /// - `attempt` is 0-based (first throttle => attempt=0).
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(Duration::from_millis(self.cfg.max_retry_after_ms));
        }

        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base = self
            .cfg
            .default_retry_after_ms
            .saturating_mul(factor)
            .min(self.cfg.max_delay_ms.max(self.cfg.default_retry_after_ms));

        let jittered = if self.cfg.jitter && base > 0 {
            let spread = (base as f64 * self.cfg.jitter_ratio.clamp(0.0, 1.0)) as u64;
            base.saturating_add(fastrand::u64(0..=spread))
        } else {
            base
        };
        Duration::from_millis(jittered)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
