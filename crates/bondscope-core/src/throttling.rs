//! Per-method sliding-window permit pools.
//!
//! A permit taken with [`MethodLimiter::acquire`] and handed back with
//! [`MethodLimiter::release`] only becomes available again one full window
//! after the release, so at most `permits_per_window` requests start within
//! any window.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::{AcquireError, ValidationError, WorkerControl};

/// Upper bound for one blocking wait so interruption is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Quota for one remote method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RateLimitSpec", into = "RateLimitSpec")]
pub struct RateLimit {
    method: String,
    permits_per_window: u32,
    window: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RateLimitSpec {
    method: String,
    permits_per_window: u32,
    #[serde(default = "default_window_secs")]
    window_secs: u64,
}

fn default_window_secs() -> u64 {
    60
}

impl RateLimit {
    pub fn new(
        method: impl Into<String>,
        permits_per_window: u32,
        window: Duration,
    ) -> Result<Self, ValidationError> {
        let method = method.into();
        if method.trim().is_empty() {
            return Err(ValidationError::EmptyMethodName);
        }
        if permits_per_window == 0 {
            return Err(ValidationError::ZeroPermits { method });
        }
        if window.is_zero() {
            return Err(ValidationError::ZeroWindow { method });
        }

        Ok(Self {
            method,
            permits_per_window,
            window,
        })
    }

    pub fn per_minute(method: impl Into<String>, permits: u32) -> Result<Self, ValidationError> {
        Self::new(method, permits, Duration::from_secs(60))
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub const fn permits_per_window(&self) -> u32 {
        self.permits_per_window
    }

    pub const fn window(&self) -> Duration {
        self.window
    }
}

impl TryFrom<RateLimitSpec> for RateLimit {
    type Error = ValidationError;

    fn try_from(spec: RateLimitSpec) -> Result<Self, Self::Error> {
        Self::new(
            spec.method,
            spec.permits_per_window,
            Duration::from_secs(spec.window_secs),
        )
    }
}

impl From<RateLimit> for RateLimitSpec {
    fn from(limit: RateLimit) -> Self {
        Self {
            method: limit.method,
            permits_per_window: limit.permits_per_window,
            window_secs: limit.window.as_secs(),
        }
    }
}

#[derive(Debug)]
struct LimiterState {
    available: u32,
    /// One entry per released permit: the instant it becomes available again.
    pending: VecDeque<Instant>,
}

impl LimiterState {
    fn reclaim(&mut self, now: Instant, permits: u32) {
        while self.pending.front().is_some_and(|due| *due <= now) {
            self.pending.pop_front();
            self.available = (self.available + 1).min(permits);
        }
    }

    fn outstanding(&self, permits: u32) -> u32 {
        let pending = u32::try_from(self.pending.len()).unwrap_or(u32::MAX);
        permits.saturating_sub(self.available).saturating_sub(pending)
    }
}

/// Permit pool for a single method.
#[derive(Debug)]
pub struct MethodLimiter {
    limit: RateLimit,
    state: Mutex<LimiterState>,
    changed: Condvar,
}

impl MethodLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let available = limit.permits_per_window;
        Self {
            limit,
            state: Mutex::new(LimiterState {
                available,
                pending: VecDeque::new(),
            }),
            changed: Condvar::new(),
        }
    }

    pub fn limit(&self) -> &RateLimit {
        &self.limit
    }

    /// Takes `n` permits if they are available at `now`.
    pub fn try_acquire_at(&self, n: u32, now: Instant) -> bool {
        let mut state = self.lock();
        state.reclaim(now, self.limit.permits_per_window);
        if state.available >= n {
            state.available -= n;
            true
        } else {
            false
        }
    }

    /// Blocks until `n` permits are available and takes them.
    ///
    /// Gives up with [`AcquireError::Interrupted`] once `control` is cancelled.
    pub fn acquire(&self, n: u32, control: &WorkerControl) -> Result<(), AcquireError> {
        let permits = self.limit.permits_per_window;
        if n > permits {
            return Err(AcquireError::ExceedsWindow {
                method: self.limit.method.clone(),
                requested: n,
                permits,
            });
        }

        let mut state = self.lock();
        loop {
            if control.is_interrupted() {
                return Err(AcquireError::Interrupted);
            }

            let now = Instant::now();
            state.reclaim(now, permits);
            if state.available >= n {
                state.available -= n;
                return Ok(());
            }

            let wait = state
                .pending
                .front()
                .map(|due| due.saturating_duration_since(now))
                .unwrap_or(WAIT_SLICE)
                .min(WAIT_SLICE);
            trace!(
                "waiting for {} permit(s) of '{}' ({} available)",
                n, self.limit.method, state.available
            );
            let (guard, _) = self
                .changed
                .wait_timeout(state, wait)
                .expect("rate limiter lock should not be poisoned");
            state = guard;
        }
    }

    /// Returns `n` permits; they become available again one window from now.
    pub fn release(&self, n: u32) {
        self.release_at(n, Instant::now());
    }

    /// Returns `n` permits released at `at`; they become available at `at + window`.
    ///
    /// Releasing more permits than are currently taken is clamped.
    pub fn release_at(&self, n: u32, at: Instant) {
        let permits = self.limit.permits_per_window;
        let ready_at = at.checked_add(self.limit.window).unwrap_or(at);

        let mut state = self.lock();
        let outstanding = state.outstanding(permits);
        if n > outstanding {
            warn!(
                "release of {} permit(s) for '{}' exceeds the {} taken; clamping",
                n, self.limit.method, outstanding
            );
        }

        for _ in 0..n.min(outstanding) {
            let position = state.pending.partition_point(|due| *due <= ready_at);
            state.pending.insert(position, ready_at);
        }
        self.changed.notify_all();
    }

    /// Permits that could be taken at `now`.
    pub fn available_at(&self, now: Instant) -> u32 {
        let mut state = self.lock();
        state.reclaim(now, self.limit.permits_per_window);
        state.available
    }

    /// Instant the earliest released permit becomes available again.
    pub fn next_release(&self) -> Option<Instant> {
        self.lock().pending.front().copied()
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state
            .lock()
            .expect("rate limiter lock should not be poisoned")
    }
}

/// All method limiters of one token session.
#[derive(Debug, Default)]
pub struct RateLimiter {
    limiters: HashMap<String, Arc<MethodLimiter>>,
}

impl RateLimiter {
    pub fn new(limits: impl IntoIterator<Item = RateLimit>) -> Self {
        let mut limiters = HashMap::new();
        for limit in limits {
            let method = limit.method().to_owned();
            if limiters
                .insert(method.clone(), Arc::new(MethodLimiter::new(limit)))
                .is_some()
            {
                warn!("duplicate rate limit for '{method}'; keeping the last one");
            }
        }
        Self { limiters }
    }

    /// Limiter for `method`, or `None` when no quota is configured for it.
    pub fn for_method(&self, method: &str) -> Option<Arc<MethodLimiter>> {
        self.limiters.get(method).cloned()
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}
