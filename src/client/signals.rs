use crate::auth::RefreshPhase;
use crate::cache::CacheStats;
use crate::resilience::RateLimiterSnapshot;

/// A facts-only snapshot of the layer's runtime state.
///
/// Nothing here is a decision; callers can build their own heuristics
/// (disable a button while a class is blocked, show a re-login prompt).
#[derive(Debug, Clone)]
pub struct SignalsSnapshot {
    /// One entry per endpoint class that has seen traffic.
    pub rate_limits: Vec<RateLimiterSnapshot>,
    pub cache: CacheStats,
    /// Keys with a coalesced read currently on the wire.
    pub in_flight: usize,
    pub refresh_phase: RefreshPhase,
    pub authenticated: bool,
}

impl SignalsSnapshot {
    pub fn rate_limit(&self, class: &str) -> Option<&RateLimiterSnapshot> {
        self.rate_limits.iter().find(|s| s.class == class)
    }
}
