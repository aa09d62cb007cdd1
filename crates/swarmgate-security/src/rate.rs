use std::time::{Duration, Instant};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request is within the window; the counter was incremented.
    Allowed,
    /// The window is exhausted; retry after the given duration.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Per-connection fixed-window counter state.
///
/// Each connection owns its own window, so checks on different connections
/// never contend on a shared lock.
#[derive(Debug)]
pub struct RateWindow {
    started: Instant,
    count: u32,
}

impl RateWindow {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            count: 0,
        }
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-window rate limiter policy.
///
/// Default: 100 requests per 60 seconds. The governor itself holds no
/// per-connection state; callers pass the connection's own [`RateWindow`].
#[derive(Debug, Clone, Copy)]
pub struct RateGovernor {
    max_requests: u32,
    window: Duration,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

impl RateGovernor {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Check one request against the window.
    ///
    /// Increments the counter only when the request is allowed; a limited
    /// request leaves the window state untouched apart from expiry rollover.
    pub fn check(&self, state: &mut RateWindow) -> RateDecision {
        let now = Instant::now();
        let elapsed = now.duration_since(state.started);

        if elapsed >= self.window {
            state.started = now;
            state.count = 0;
        }

        if state.count < self.max_requests {
            state.count += 1;
            RateDecision::Allowed
        } else {
            tracing::debug!(count = state.count, "rate window exhausted");
            RateDecision::Limited {
                retry_after: self.window - elapsed,
            }
        }
    }
}
