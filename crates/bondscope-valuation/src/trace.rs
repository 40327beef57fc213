//! Structured explanation of a valuation, one line item per contribution.

use std::fmt::{Display, Formatter};

use bondscope_core::Money;
use serde::Serialize;

/// How a coupon contributes to profit over a holding window
/// `(as_of, eval_date]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponCase {
    /// The whole period, its record date and its payment lie inside the
    /// window; full payment.
    FullPeriod,
    /// Current at purchase but the registry was already fixed; the payment
    /// goes to the previous holder.
    FixedBeforePurchase,
    /// Bought before fixation and still held at fixation; full payment,
    /// possibly paid after the evaluation date.
    HeldThroughFixation,
    /// Current and unfixed at the evaluation date; the buyer pays accrued income.
    SoldWithAccrued,
    /// Period ended before purchase but fixation falls inside the window.
    PaidAfterPeriodEnd,
    /// No contribution.
    OutsideWindow,
}

impl Display for CouponCase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::FullPeriod => "full period held",
            Self::FixedBeforePurchase => "registry fixed before purchase",
            Self::HeldThroughFixation => "held through registry fixation",
            Self::SoldWithAccrued => "accrued income received on sale",
            Self::PaidAfterPeriodEnd => "paid after period end",
            Self::OutsideWindow => "outside holding window",
        };
        f.write_str(text)
    }
}

/// Why a value is absent or was approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Remark {
    UnsupportedMulticurrency,
    ZeroCouponPeriod { coupon: u32 },
    NoCurrentCoupon,
    PriceMissing,
    ZeroPrice,
    NominalAsPrice,
}

impl Display for Remark {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedMulticurrency => f.write_str("multi-currency bonds are not supported"),
            Self::ZeroCouponPeriod { coupon } => write!(f, "coupon #{coupon} has a zero-day period"),
            Self::NoCurrentCoupon => f.write_str("no coupon period covers the date"),
            Self::PriceMissing => f.write_str("no last price"),
            Self::ZeroPrice => f.write_str("last price is zero"),
            Self::NominalAsPrice => f.write_str("last price unknown, nominal used instead"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "line")]
pub enum TraceLine {
    Coupon {
        number: u32,
        case: CouponCase,
        amount: Money,
    },
    Accrued {
        coupon: u32,
        days: i64,
        period_days: u32,
        amount: Money,
    },
    AccruedPaid { amount: Money },
    Redemption { amount: Money },
    Purchase { amount: Money },
    Commission { amount: Money },
    Remark(Remark),
}

impl Display for TraceLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Coupon {
                number,
                case,
                amount,
            } => write!(f, "coupon #{number}: {amount} ({case})"),
            Self::Accrued {
                coupon,
                days,
                period_days,
                amount,
            } => write!(f, "coupon #{coupon}: {amount} accrued over {days} of {period_days} days"),
            Self::AccruedPaid { amount } => write!(f, "accrued income paid at purchase: {amount}"),
            Self::Redemption { amount } => write!(f, "nominal repaid: {amount}"),
            Self::Purchase { amount } => write!(f, "purchase with commission: {amount}"),
            Self::Commission { amount } => write!(f, "commission: {amount}"),
            Self::Remark(remark) => remark.fmt(f),
        }
    }
}

/// A possibly absent result together with the line items that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Valuation<T> {
    pub value: Option<T>,
    pub trace: Vec<TraceLine>,
}

impl<T> Default for Valuation<T> {
    fn default() -> Self {
        Self {
            value: None,
            trace: Vec::new(),
        }
    }
}

impl<T> Valuation<T> {
    pub fn unavailable(remark: Remark) -> Self {
        Self {
            value: None,
            trace: vec![TraceLine::Remark(remark)],
        }
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }

    /// Human-readable lines, one per trace item.
    pub fn explain(&self) -> Vec<String> {
        self.trace.iter().map(ToString::to_string).collect()
    }

    pub fn remarks(&self) -> impl Iterator<Item = Remark> + '_ {
        self.trace.iter().filter_map(|line| match line {
            TraceLine::Remark(remark) => Some(*remark),
            _ => None,
        })
    }

    pub(crate) fn push(&mut self, line: TraceLine) {
        self.trace.push(line);
    }

    pub(crate) fn fail(mut self, remark: Remark) -> Self {
        self.value = None;
        self.trace.push(TraceLine::Remark(remark));
        self
    }

    pub(crate) fn with_value(mut self, value: T) -> Self {
        self.value = Some(value);
        self
    }

    /// Keeps the trace, replacing the value.
    pub(crate) fn rebind<U>(self, value: Option<U>) -> Valuation<U> {
        Valuation {
            value,
            trace: self.trace,
        }
    }
}
