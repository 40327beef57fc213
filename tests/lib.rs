//! Shared fixtures for the behavior tests: a scripted remote API and
//! money/date helpers.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub use bondscope_core::*;
pub use rust_decimal::Decimal;
pub use std::sync::Arc;
use time::macros::date;
use time::Date;

pub fn rub(amount: &str) -> Money {
    Money::new(
        Decimal::from_str(amount).expect("valid decimal"),
        Currency::parse("RUB").expect("valid currency"),
    )
}

pub fn uids(count: usize) -> Vec<InstrumentUid> {
    (0..count).map(|_| InstrumentUid::random()).collect()
}

/// A session allowing `permits` bond-coupon and last-price calls per minute.
pub fn session(permits: u32) -> TokenSession {
    TokenSession::new(
        Token::new("t.behavior").expect("valid token"),
        [Method::GetBondCoupons, Method::GetLastPrices]
            .into_iter()
            .map(|method| RateLimit::per_minute(method.as_str(), permits).expect("valid limit")),
    )
}

/// Two semi-annual 41 RUB coupons covering 2024.
pub fn sample_coupons() -> Vec<Coupon> {
    vec![
        coupon(1, date!(2024 - 01 - 01), date!(2024 - 07 - 01), date!(2024 - 06 - 28)),
        coupon(2, date!(2024 - 07 - 01), date!(2025 - 01 - 01), date!(2024 - 12 - 28)),
    ]
}

pub fn coupon(number: u32, start: Date, end: Date, fix: Date) -> Coupon {
    let period = u32::try_from((end - start).whole_days()).expect("positive period");
    Coupon::new(number, rub("41.00"), CouponType::Constant, period, start, end, fix, end)
        .expect("valid coupon")
}

#[derive(Default)]
struct ApiState {
    calls: Vec<InstrumentUid>,
    failures_left: HashMap<InstrumentUid, u32>,
    hold_call: Option<usize>,
}

/// Remote API fake serving coupons and last prices.
///
/// It records every call in order, can fail chosen targets a number of times,
/// and can hold a given call (1-based) until [`ScriptedApi::release`].
#[derive(Default)]
pub struct ScriptedApi {
    state: Mutex<ApiState>,
    changed: Condvar,
    latency: Duration,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn fail_times(&self, uid: InstrumentUid, times: u32) {
        self.lock().failures_left.insert(uid, times);
    }

    pub fn hold_call(&self, call: usize) {
        self.lock().hold_call = Some(call);
    }

    pub fn release(&self) {
        self.lock().hold_call = None;
        self.changed.notify_all();
    }

    pub fn calls(&self) -> Vec<InstrumentUid> {
        self.lock().calls.clone()
    }

    /// Waits until at least `count` calls were made.
    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.calls.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .expect("api lock");
            state = guard;
        }
        true
    }

    fn record(&self, uid: InstrumentUid) -> bool {
        let mut state = self.lock();
        state.calls.push(uid);
        let call = state.calls.len();
        self.changed.notify_all();

        while state.hold_call == Some(call) {
            state = self.changed.wait(state).expect("api lock");
        }

        match state.failures_left.get_mut(&uid) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().expect("api lock")
    }
}

impl RemoteApi for ScriptedApi {
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none()
            .with(Method::GetBondCoupons)
            .with(Method::GetLastPrices)
    }

    fn bond_coupons(
        &self,
        _token: &Token,
        uid: InstrumentUid,
        _from: Option<Date>,
        _to: Option<Date>,
    ) -> RequestOutcome<Vec<Coupon>> {
        let ok = self.record(uid);
        thread::sleep(self.latency);
        if ok {
            RequestOutcome::Success(sample_coupons())
        } else {
            RequestOutcome::request_error("UNAVAILABLE")
        }
    }

    fn last_price(&self, _token: &Token, uid: InstrumentUid) -> RequestOutcome<LastPrice> {
        if self.record(uid) {
            RequestOutcome::Success(LastPrice {
                uid,
                price: Some(rub("985.50")),
                time: time::OffsetDateTime::UNIX_EPOCH,
            })
        } else {
            RequestOutcome::exception("connection reset")
        }
    }
}

/// Polls `condition` every few milliseconds until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
