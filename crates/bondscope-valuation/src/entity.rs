//! Live bond state that recomputes when new coupon data arrives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bondscope_core::{
    Bond, BondCoupons, Coupon, CouponSchedule, InstrumentUid, LastPrice, Money, ScheduleAnomaly,
    ValidationError,
};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::engine::{self, LastPriceState};
use crate::{Remark, TraceLine, Valuation, ValuationConfig, ValuationError};

/// Emitted once per successful coupon replacement.
///
/// Carries identity only; `generation` increases with every replacement so
/// an observer notified twice for the same update can ignore the repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CouponsReplaced {
    pub uid: InstrumentUid,
    pub generation: u64,
}

type Observer = Arc<dyn Fn(&CouponsReplaced) + Send + Sync>;

/// A bond with its current coupon schedule and last price.
///
/// The schedule is swapped wholesale behind an `Arc`, so readers always see
/// either the old or the new set.
pub struct BondEntity {
    bond: Bond,
    config: ValuationConfig,
    as_of: Option<Date>,
    coupons: RwLock<Arc<CouponSchedule>>,
    last_price: RwLock<LastPriceState>,
    generation: AtomicU64,
    observers: Mutex<Vec<Observer>>,
}

impl std::fmt::Debug for BondEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BondEntity")
            .field("bond", &self.bond)
            .field("config", &self.config)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl BondEntity {
    pub fn new(bond: Bond, config: ValuationConfig) -> Self {
        Self {
            bond,
            config,
            as_of: None,
            coupons: RwLock::new(Arc::new(CouponSchedule::default())),
            last_price: RwLock::new(LastPriceState::NotLoaded),
            generation: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Pins the purchase date instead of using today's date.
    pub fn with_as_of(mut self, as_of: Date) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn bond(&self) -> &Bond {
        &self.bond
    }

    pub fn uid(&self) -> InstrumentUid {
        self.bond.uid
    }

    pub fn as_of(&self) -> Date {
        self.as_of
            .unwrap_or_else(|| OffsetDateTime::now_utc().date())
    }

    /// Snapshot of the current schedule.
    pub fn coupons(&self) -> Arc<CouponSchedule> {
        Arc::clone(
            &self
                .coupons
                .read()
                .expect("coupon schedule lock should not be poisoned"),
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn last_price(&self) -> LastPriceState {
        *self
            .last_price
            .read()
            .expect("last price lock should not be poisoned")
    }

    pub fn subscribe(&self, observer: impl Fn(&CouponsReplaced) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("observer list lock should not be poisoned")
            .push(Arc::new(observer));
    }

    /// Replaces the whole coupon schedule and notifies observers.
    ///
    /// Coupons paying in another currency are rejected. Overlaps and coupons
    /// past maturity are accepted, logged and returned.
    pub fn set_coupons(&self, coupons: Vec<Coupon>) -> Result<Vec<ScheduleAnomaly>, ValidationError> {
        if let Some(foreign) = coupons
            .iter()
            .find(|coupon| coupon.pay_one_bond.currency != self.bond.currency)
        {
            return Err(ValidationError::CouponCurrency {
                number: foreign.number,
                expected: self.bond.currency,
                actual: foreign.pay_one_bond.currency,
            });
        }

        let schedule = CouponSchedule::new(coupons);
        let anomalies = schedule.anomalies(self.bond.maturity_date);
        for anomaly in &anomalies {
            warn!("bond {}: {anomaly}", self.bond.uid);
        }

        let generation = {
            let mut current = self
                .coupons
                .write()
                .expect("coupon schedule lock should not be poisoned");
            *current = Arc::new(schedule);
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        debug!("bond {}: coupons replaced (generation {generation})", self.bond.uid);

        self.notify(&CouponsReplaced {
            uid: self.bond.uid,
            generation,
        });
        Ok(anomalies)
    }

    pub fn set_last_price(&self, price: LastPriceState) {
        *self
            .last_price
            .write()
            .expect("last price lock should not be poisoned") = price;
    }

    pub fn apply_last_price(&self, price: &LastPrice) {
        self.set_last_price(LastPriceState::from(price.price));
    }

    /// Coupon income accrued on `date` (registry fixation ignored).
    pub fn accrued_income(&self, date: Date) -> Result<Valuation<Money>, ValuationError> {
        let schedule = self.coupons();
        let Some(coupon) = engine::current_coupon(schedule.coupons(), date)? else {
            return Ok(Valuation::unavailable(Remark::NoCurrentCoupon));
        };

        Ok(match engine::accrued_coupon_income(coupon, date, false) {
            Some(amount) => Valuation {
                value: Some(amount),
                trace: vec![TraceLine::Accrued {
                    coupon: coupon.number,
                    days: engine::days_since_period_start(coupon, date),
                    period_days: coupon.period_days,
                    amount,
                }],
            },
            None => Valuation::unavailable(Remark::ZeroCouponPeriod {
                coupon: coupon.number,
            }),
        })
    }

    /// Profit of holding from [`BondEntity::as_of`] until `date`.
    pub fn absolute_profit(&self, date: Date) -> Result<Valuation<Money>, ValuationError> {
        let schedule = self.coupons();
        engine::absolute_profit(
            &self.bond,
            schedule.coupons(),
            &self.last_price(),
            date,
            self.as_of(),
            &self.config,
        )
    }

    pub fn relative_profit(&self, date: Date) -> Result<Valuation<Decimal>, ValuationError> {
        let schedule = self.coupons();
        engine::relative_profit(
            &self.bond,
            schedule.coupons(),
            &self.last_price(),
            date,
            self.as_of(),
            &self.config,
        )
    }

    pub fn annual_relative_profit(&self) -> Result<Option<Decimal>, ValuationError> {
        let schedule = self.coupons();
        engine::annual_relative_profit(schedule.coupons(), self.bond.nominal, self.as_of())
    }

    fn notify(&self, event: &CouponsReplaced) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .expect("observer list lock should not be poisoned")
            .clone();
        for observer in &observers {
            observer(event);
        }
    }
}

/// Routes fetched [`BondCoupons`] payloads to the entities they belong to.
#[derive(Debug, Default)]
pub struct CouponSink {
    entities: HashMap<InstrumentUid, Arc<BondEntity>>,
}

impl CouponSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: Arc<BondEntity>) {
        self.entities.insert(entity.uid(), entity);
    }

    pub fn entity(&self, uid: &InstrumentUid) -> Option<&Arc<BondEntity>> {
        self.entities.get(uid)
    }

    /// Replaces the coupons of the matching entity. `Ok(false)` when no
    /// entity is registered for the payload's bond.
    pub fn accept(&self, payload: BondCoupons) -> Result<bool, ValidationError> {
        let Some(entity) = self.entities.get(&payload.uid) else {
            debug!("no live entity for bond {}; coupons dropped", payload.uid);
            return Ok(false);
        };
        entity.set_coupons(payload.coupons)?;
        Ok(true)
    }

    pub fn accept_price(&self, price: &LastPrice) -> bool {
        match self.entities.get(&price.uid) {
            Some(entity) => {
                entity.apply_last_price(price);
                true
            }
            None => false,
        }
    }
}
