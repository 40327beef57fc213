use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Currency, InstrumentUid, Money, ValidationError};

/// Bond attributes needed for valuation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub uid: InstrumentUid,
    pub currency: Currency,
    pub nominal: Money,
    pub initial_nominal: Money,
    /// Accrued coupon income currently quoted for one bond.
    pub aci_value: Money,
    pub maturity_date: Option<Date>,
    pub perpetual: bool,
    pub lot: u32,
    pub amortization: bool,
}

impl Bond {
    /// Builds a plain bullet bond denominated in the nominal's currency.
    pub fn new(uid: InstrumentUid, nominal: Money, aci_value: Money, maturity_date: Option<Date>) -> Self {
        Self {
            uid,
            currency: nominal.currency,
            nominal,
            initial_nominal: nominal,
            aci_value,
            maturity_date,
            perpetual: maturity_date.is_none(),
            lot: 1,
            amortization: false,
        }
    }

    pub fn with_initial_nominal(mut self, initial_nominal: Money) -> Self {
        self.initial_nominal = initial_nominal;
        self.amortization = initial_nominal != self.nominal;
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_lot(mut self, lot: u32) -> Self {
        self.lot = lot;
        self
    }

    /// Nominal, initial nominal and accrued income are not all in the bond's currency.
    pub fn is_multicurrency(&self) -> bool {
        self.nominal.currency != self.currency
            || self.initial_nominal.currency != self.currency
            || self.aci_value.currency != self.currency
    }

    /// Whether the nominal is repaid on or before `date`.
    pub fn matures_by(&self, date: Date) -> bool {
        !self.perpetual && self.maturity_date.is_some_and(|maturity| maturity <= date)
    }
}

/// Coupon rate kind as reported by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponType {
    Unspecified,
    Constant,
    Floating,
    Discount,
    Mortgage,
    Fix,
    Variable,
    Other,
}

/// One coupon period of a bond.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub number: u32,
    pub pay_one_bond: Money,
    pub coupon_type: CouponType,
    pub period_days: u32,
    pub start_date: Date,
    pub end_date: Date,
    /// Record date; holders on this date receive the payment.
    pub fix_date: Date,
    pub pay_date: Date,
}

impl Coupon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: u32,
        pay_one_bond: Money,
        coupon_type: CouponType,
        period_days: u32,
        start_date: Date,
        end_date: Date,
        fix_date: Date,
        pay_date: Date,
    ) -> Result<Self, ValidationError> {
        if end_date < start_date {
            return Err(ValidationError::InvalidCouponPeriod {
                number,
                start: start_date,
                end: end_date,
            });
        }
        if pay_one_bond.amount.is_sign_negative() {
            return Err(ValidationError::NegativeValue {
                field: "pay_one_bond",
            });
        }

        Ok(Self {
            number,
            pay_one_bond,
            coupon_type,
            period_days,
            start_date,
            end_date,
            fix_date,
            pay_date,
        })
    }

    /// Whether `date` falls into the half-open period `[start_date, end_date)`.
    pub fn contains(&self, date: Date) -> bool {
        self.start_date <= date && date < self.end_date
    }

    pub fn overlaps(&self, other: &Coupon) -> bool {
        self.start_date < other.end_date && other.start_date < self.end_date
    }
}

/// Data problems found in a coupon schedule. Reported, never silently fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleAnomaly {
    Overlap { first: u32, second: u32 },
    BeyondMaturity { number: u32, end_date: Date, maturity: Date },
}

impl Display for ScheduleAnomaly {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overlap { first, second } => {
                write!(f, "coupon periods #{first} and #{second} overlap")
            }
            Self::BeyondMaturity {
                number,
                end_date,
                maturity,
            } => write!(
                f,
                "coupon #{number} ends {end_date}, after bond maturity {maturity}"
            ),
        }
    }
}

/// A bond's coupons ordered ascending by end date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponSchedule {
    coupons: Vec<Coupon>,
}

impl CouponSchedule {
    pub fn new(mut coupons: Vec<Coupon>) -> Self {
        coupons.sort_by(|left, right| {
            left.end_date
                .cmp(&right.end_date)
                .then_with(|| left.start_date.cmp(&right.start_date))
                .then_with(|| left.number.cmp(&right.number))
        });
        Self { coupons }
    }

    pub fn coupons(&self) -> &[Coupon] {
        &self.coupons
    }

    pub fn len(&self) -> usize {
        self.coupons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coupons.is_empty()
    }

    pub fn last(&self) -> Option<&Coupon> {
        self.coupons.last()
    }

    /// Finds overlapping periods and coupons running past `maturity`.
    pub fn anomalies(&self, maturity: Option<Date>) -> Vec<ScheduleAnomaly> {
        let mut anomalies = Vec::new();

        let mut by_start: Vec<&Coupon> = self.coupons.iter().collect();
        by_start.sort_by_key(|coupon| (coupon.start_date, coupon.end_date));

        let mut furthest: Option<&Coupon> = None;
        for coupon in by_start {
            if let Some(previous) = furthest {
                if coupon.overlaps(previous) {
                    anomalies.push(ScheduleAnomaly::Overlap {
                        first: previous.number,
                        second: coupon.number,
                    });
                }
                if coupon.end_date > previous.end_date {
                    furthest = Some(coupon);
                }
            } else {
                furthest = Some(coupon);
            }
        }

        if let (Some(last), Some(maturity)) = (self.coupons.last(), maturity) {
            if last.end_date > maturity {
                anomalies.push(ScheduleAnomaly::BeyondMaturity {
                    number: last.number,
                    end_date: last.end_date,
                    maturity,
                });
            }
        }

        anomalies
    }
}

impl From<Vec<Coupon>> for CouponSchedule {
    fn from(coupons: Vec<Coupon>) -> Self {
        Self::new(coupons)
    }
}
