use bondscope_core::MoneyError;
use thiserror::Error;
use time::Date;

/// Hard failures of the valuation engine.
///
/// Soft guards (zero coupon period, multi-currency bonds, missing prices)
/// never surface here; they yield an absent value and a trace remark.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("coupons #{first} and #{second} both cover {date}")]
    AmbiguousCouponPeriod { date: Date, first: u32, second: u32 },

    #[error(transparent)]
    Money(#[from] MoneyError),
}
