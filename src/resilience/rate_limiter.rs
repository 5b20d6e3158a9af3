use crate::utils::clock::{self, Clock};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Class used for any path that matches no configured prefix.
pub const DEFAULT_CLASS: &str = "default";

/// Longest accepted window (one day).
pub const MAX_WINDOW_MS: u64 = 86_400_000;

/// Cap for deadlines that would not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `{max_requests, window_ms}` budget for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// A named endpoint class selected by path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointClass {
    pub name: String,
    pub path_prefix: String,
    #[serde(flatten)]
    pub policy: RateLimitPolicy,
}

impl EndpointClass {
    pub fn new(name: impl Into<String>, path_prefix: impl Into<String>, policy: RateLimitPolicy) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub default: RateLimitPolicy,
    pub classes: Vec<EndpointClass>,
}

impl RateLimiterConfig {
    /// Config with only a default policy and no named classes.
    pub fn new(default: RateLimitPolicy) -> Self {
        Self {
            default,
            classes: Vec::new(),
        }
    }

    /// Add (or replace) a named class.
    pub fn with_class(mut self, class: EndpointClass) -> Self {
        self.classes.retain(|c| c.name != class.name);
        self.classes.push(class);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, policy: &RateLimitPolicy| -> Result<()> {
            if policy.max_requests == 0 || policy.window_ms == 0 || policy.window_ms > MAX_WINDOW_MS {
                return Err(Error::configuration_with_context(
                    format!(
                        "rate limit policy needs max_requests >= 1 and window_ms in 1..={}",
                        MAX_WINDOW_MS
                    ),
                    ErrorContext::new()
                        .with_field_path(format!("rate_limits.{}", name))
                        .with_source("rate_limiter"),
                ));
            }
            Ok(())
        };
        check(DEFAULT_CLASS, &self.default)?;
        for class in &self.classes {
            check(&class.name, &class.policy)?;
        }
        Ok(())
    }
}

impl Default for RateLimiterConfig {
    /// Looser default budget; tighter budgets for the chatty and sensitive endpoints.
    fn default() -> Self {
        Self::new(RateLimitPolicy::new(100, 60_000))
            .with_class(EndpointClass::new(
                "conversations",
                "/api/conversations",
                RateLimitPolicy::new(30, 60_000),
            ))
            .with_class(EndpointClass::new(
                "contacts",
                "/api/contacts",
                RateLimitPolicy::new(50, 60_000),
            ))
            .with_class(EndpointClass::new(
                "auth",
                "/api/auth",
                RateLimitPolicy::new(10, 60_000),
            ))
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub class: String,
    pub max_requests: u32,
    pub window_ms: u64,
    /// Requests counted in the current window (0 when no live window).
    pub count: u32,
    /// Time until the current window resets (ms), if a window is live.
    pub window_remaining_ms: Option<u64>,
    /// Remaining server-imposed block (ms), if any.
    pub blocked_remaining_ms: Option<u64>,
}

/// Fixed counting window for one class.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
struct ClassState {
    window: Option<RateWindow>,
    /// Absolute time until which the server asked us to hold off (429)
    blocked_until: Option<Instant>,
    consecutive_throttles: u32,
}

impl ClassState {
    /// Live window at `now`, dropping an expired one.
    fn live_window(&mut self, now: Instant) -> Option<&mut RateWindow> {
        if matches!(self.window, Some(w) if now > w.reset_at) {
            self.window = None;
        }
        self.window.as_mut()
    }

    fn blocked_for(&mut self, now: Instant) -> Option<Duration> {
        match self.blocked_until {
            Some(until) if until > now => Some(until - now),
            Some(_) => {
                self.blocked_until = None;
                None
            }
            None => None,
        }
    }
}

/// Per-endpoint-class fixed-window rate limiter.
///
/// - A fresh window starts at the first attempt after the previous one expired
/// - Attempts over budget are rejected before being counted
/// - Memory is bounded by the number of classes, not the number of paths
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<String, ClassState>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self::with_clock(cfg, clock::system())
    }

    pub fn with_clock(cfg: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    /// Resolve the endpoint class of a path (longest matching prefix wins).
    pub fn class_for(&self, path: &str) -> &str {
        self.cfg
            .classes
            .iter()
            .filter(|c| path_has_prefix(path, &c.path_prefix))
            .max_by_key(|c| c.path_prefix.len())
            .map(|c| c.name.as_str())
            .unwrap_or(DEFAULT_CLASS)
    }

    pub fn policy_for(&self, class: &str) -> RateLimitPolicy {
        self.cfg
            .classes
            .iter()
            .find(|c| c.name == class)
            .map(|c| c.policy)
            .unwrap_or(self.cfg.default)
    }

    /// Admission check: counts the attempt when allowed, never when rejected.
    pub fn admit(&self, class: &str) -> bool {
        let policy = self.policy_for(class);
        let now = self.clock.now();
        let mut classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let st = classes.entry(class.to_string()).or_default();

        if let Some(wait) = st.blocked_for(now) {
            debug!(
                endpoint_class = class,
                blocked_ms = wait.as_millis() as u64,
                "rate limiter holding class after server throttle"
            );
            return false;
        }

        match st.live_window(now) {
            None => {
                st.window = Some(RateWindow {
                    count: 1,
                    reset_at: deadline(now, policy.window()),
                });
                true
            }
            Some(w) if w.count < policy.max_requests => {
                w.count += 1;
                true
            }
            Some(w) => {
                debug!(
                    endpoint_class = class,
                    count = w.count,
                    max_requests = policy.max_requests,
                    "rate limit window exhausted"
                );
                false
            }
        }
    }

    /// [`admit`](Self::admit) as a `Result`, for use with `?`.
    pub fn check(&self, class: &str) -> Result<()> {
        if self.admit(class) {
            Ok(())
        } else {
            Err(Error::RateLimitExceeded {
                class: class.to_string(),
            })
        }
    }

    /// Count a call that did not pass through [`admit`](Self::admit).
    pub fn record(&self, class: &str) {
        let policy = self.policy_for(class);
        let now = self.clock.now();
        let mut classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let st = classes.entry(class.to_string()).or_default();
        match st.live_window(now) {
            Some(w) => w.count = w.count.saturating_add(1),
            None => {
                st.window = Some(RateWindow {
                    count: 1,
                    reset_at: deadline(now, policy.window()),
                })
            }
        }
    }

    /// Number of consecutive server throttles seen for `class`.
    pub fn throttle_count(&self, class: &str) -> u32 {
        let classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        classes
            .get(class)
            .map(|st| st.consecutive_throttles)
            .unwrap_or(0)
    }

    /// Hold `class` closed for `delay` after a server throttle.
    pub fn defer(&self, class: &str, delay: Duration) {
        let until = deadline(self.clock.now(), delay);
        let mut classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let st = classes.entry(class.to_string()).or_default();
        st.consecutive_throttles = st.consecutive_throttles.saturating_add(1);
        st.blocked_until = Some(match st.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    /// A successful response ends the throttle streak for its class.
    pub fn on_success(&self, class: &str) {
        let mut classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(st) = classes.get_mut(class) {
            st.consecutive_throttles = 0;
        }
    }

    pub fn snapshot(&self, class: &str) -> RateLimiterSnapshot {
        let policy = self.policy_for(class);
        let now = self.clock.now();
        let mut classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (count, window_remaining_ms, blocked_remaining_ms) = match classes.get_mut(class) {
            Some(st) => {
                let blocked = st.blocked_for(now).map(|d| d.as_millis() as u64);
                match st.live_window(now) {
                    Some(w) => (
                        w.count,
                        Some(w.reset_at.saturating_duration_since(now).as_millis() as u64),
                        blocked,
                    ),
                    None => (0, None, blocked),
                }
            }
            None => (0, None, None),
        };

        RateLimiterSnapshot {
            class: class.to_string(),
            max_requests: policy.max_requests,
            window_ms: policy.window_ms,
            count,
            window_remaining_ms,
            blocked_remaining_ms,
        }
    }

    /// Snapshots for every class that has seen traffic, sorted by class name.
    pub fn snapshots(&self) -> Vec<RateLimiterSnapshot> {
        let mut names: Vec<String> = {
            let classes = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            classes.keys().cloned().collect()
        };
        names.sort();
        names.iter().map(|n| self.snapshot(n)).collect()
    }
}

/// `now + after`, saturating instead of panicking on overflow.
fn deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Prefix match on segment boundaries: `/api/contacts` matches `/api/contacts/7`
/// and `/api/contacts?x`, not `/api/contactsx`.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
