//! crates/wiki_quiz_core/src/rate_limit.rs
//!
//! Fixed-window, per-client request limiting.
//!
//! A client may trigger `max_requests` generations per window. The window
//! starts at the client's first request and resets on the first request made
//! after it has fully elapsed. Bursts of up to twice the quota across a window
//! boundary are possible and accepted.

use crate::domain::UsageWindow;
use crate::ports::{Clock, PortResult, UsageStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DEFAULT_MAX_REQUESTS: u32 = 2;
pub const DEFAULT_WINDOW_SECS: i64 = 60 * 60;

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::seconds(DEFAULT_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Reject { retry_after_minutes: i64 },
}

/// Applies one request to a client's window.
///
/// Returns the decision and, when the window changed, its new state.
pub fn admit(
    existing: Option<&UsageWindow>,
    client_key: &str,
    now: DateTime<Utc>,
    policy: &RateLimitPolicy,
) -> (RateDecision, Option<UsageWindow>) {
    let fresh = || UsageWindow {
        client_key: client_key.to_string(),
        count: 1,
        window_start: now,
    };

    match existing {
        None => (RateDecision::Allow, Some(fresh())),
        Some(window) if now - window.window_start > policy.window => {
            (RateDecision::Allow, Some(fresh()))
        }
        Some(window) if window.count < policy.max_requests => {
            let mut next = window.clone();
            next.count += 1;
            (RateDecision::Allow, Some(next))
        }
        Some(window) => {
            let remaining = window.window_start + policy.window - now;
            let retry_after_minutes = ((remaining.num_milliseconds() + 59_999) / 60_000).max(1);
            (RateDecision::Reject { retry_after_minutes }, None)
        }
    }
}

/// Enforces a `RateLimitPolicy` against windows kept in a `UsageStore`.
pub struct RateLimiter {
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
    // Serializes the read-modify-write on the store.
    gate: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn UsageStore>, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            gate: Mutex::new(()),
        }
    }

    /// Charges one request to `client_key`, or rejects it when over quota.
    pub async fn check(&self, client_key: &str) -> PortResult<RateDecision> {
        let _guard = self.gate.lock().await;
        let now = self.clock.now();
        let existing = self.store.get_window(client_key).await?;

        let (decision, updated) = admit(existing.as_ref(), client_key, now, &self.policy);
        if let Some(window) = updated {
            self.store.put_window(&window).await?;
            debug!(client_key, count = window.count, "Request counted against quota.");
        }
        if let RateDecision::Reject { retry_after_minutes } = decision {
            info!(client_key, retry_after_minutes, "Rate limit exceeded.");
        }
        Ok(decision)
    }

    /// Removes windows that have fully elapsed. Pruning an expired window is
    /// equivalent to the reset its next request would perform.
    pub async fn prune_stale(&self) -> PortResult<u64> {
        let _guard = self.gate.lock().await;
        let cutoff = self.clock.now() - self.policy.window;
        self.store.prune_windows(cutoff).await
    }
}
